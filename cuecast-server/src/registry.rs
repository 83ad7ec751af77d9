//! Connection registry and admission control
//!
//! Tracks every live transport connection, enforces the global ceiling and
//! the per-endpoint duplicate limit at accept time, and owns the connection
//! lifecycle state machine. Workers and handlers refer to connections by
//! [`ConnId`] only; entries never leave the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// Unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Create a ConnId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Conn({})", self.0)
    }
}

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Ready,
    Idle,
    Closing,
    Closed,
    Failed,
}

impl ConnState {
    /// Terminal states absorb all further events
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Single entry point of the connection state machine
    pub fn transition(self, event: ConnEvent) -> ConnState {
        if self.is_terminal() {
            return self;
        }
        match (self, event) {
            (Self::Connecting, ConnEvent::Admitted) => Self::Ready,
            (_, ConnEvent::RequestServed) => Self::Ready,
            (Self::Ready, ConnEvent::WentIdle) => Self::Idle,
            (_, ConnEvent::CloseRequested) => Self::Closing,
            (_, ConnEvent::TransportClosed) => Self::Closed,
            (_, ConnEvent::TransportFailed) => Self::Failed,
            (state, _) => state,
        }
    }
}

/// Events driving the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnEvent {
    Admitted,
    RequestServed,
    WentIdle,
    CloseRequested,
    TransportClosed,
    TransportFailed,
}

/// Entry for one live connection
pub struct ConnectionEntry {
    /// Remote endpoint (peer address without port)
    pub remote: String,
    pub state: ConnState,
    /// Requests served on this connection
    pub requests: u64,
    pub last_activity: Instant,
    /// Declared client identity, recorded from the first request that
    /// carried one
    pub client_identity: Option<String>,
    /// Signal used to unblock the worker's read wait on close
    close_tx: mpsc::Sender<()>,
}

impl ConnectionEntry {
    fn new(remote: &str, close_tx: mpsc::Sender<()>) -> Self {
        Self {
            remote: remote.to_string(),
            state: ConnState::Connecting,
            requests: 0,
            last_activity: Instant::now(),
            client_identity: None,
            close_tx,
        }
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("remote", &self.remote)
            .field("state", &self.state)
            .field("requests", &self.requests)
            .field("client_identity", &self.client_identity)
            .finish()
    }
}

/// Clone-out view of one connection for introspection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnId,
    pub remote: String,
    pub state: ConnState,
    pub requests: u64,
    pub client_identity: Option<String>,
}

/// Per-endpoint admission bookkeeping
///
/// Kept separate from the connection table so both limit checks and their
/// application happen under one lock, atomic relative to concurrent accepts.
#[derive(Default)]
struct AdmissionState {
    live: usize,
    per_endpoint: HashMap<String, usize>,
}

/// Registry tracking all live connections
///
/// Thread-safe for concurrent access from the accept loop, every connection
/// worker, and the housekeeping tasks.
pub struct ConnectionRegistry {
    /// Connection ID -> entry; hot path for per-request `touch`
    connections: DashMap<ConnId, ConnectionEntry>,
    /// Admission counters, mutated only on register/remove
    admission: Mutex<AdmissionState>,
    /// Counter for generating unique connection IDs
    next_conn_id: AtomicU64,
    max_connections: usize,
    per_endpoint_limit: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, per_endpoint_limit: usize) -> Self {
        Self {
            connections: DashMap::new(),
            admission: Mutex::new(AdmissionState::default()),
            next_conn_id: AtomicU64::new(1),
            max_connections,
            per_endpoint_limit,
        }
    }

    // ==================== Admission ====================

    /// Admit a new connection
    ///
    /// Returns None when either the global ceiling or the per-endpoint
    /// duplicate limit would be exceeded; the caller closes the stream
    /// silently in that case.
    pub fn register(&self, remote: &str, close_tx: mpsc::Sender<()>) -> Option<ConnId> {
        let mut admission = self.admission.lock();

        if admission.live >= self.max_connections {
            debug!("Rejecting connection from {}: at capacity", remote);
            return None;
        }

        let same_endpoint = admission.per_endpoint.get(remote).copied().unwrap_or(0);
        if same_endpoint >= self.per_endpoint_limit {
            debug!(
                "Rejecting connection from {}: endpoint already has {} connections",
                remote, same_endpoint
            );
            return None;
        }

        admission.live += 1;
        *admission.per_endpoint.entry(remote.to_string()).or_insert(0) += 1;

        let id = ConnId(self.next_conn_id.fetch_add(1, Ordering::SeqCst));
        let mut entry = ConnectionEntry::new(remote, close_tx);
        entry.state = entry.state.transition(ConnEvent::Admitted);

        // Insert while still holding the admission lock so the counters and
        // the table can never disagree.
        self.connections.insert(id, entry);
        drop(admission);

        debug!("Registered connection {} from {}", id, remote);
        Some(id)
    }

    /// Deregister a connection and release its bookkeeping
    ///
    /// Returns false if the connection was already gone, which makes the
    /// worker-exit/housekeeping race a harmless no-op on the second call.
    /// The associated client session, if any, is left untouched.
    pub fn remove(&self, conn_id: ConnId) -> bool {
        let mut admission = self.admission.lock();

        if let Some((_, entry)) = self.connections.remove(&conn_id) {
            admission.live -= 1;
            if let Some(count) = admission.per_endpoint.get_mut(&entry.remote) {
                *count -= 1;
                if *count == 0 {
                    admission.per_endpoint.remove(&entry.remote);
                }
            }
            debug!("Removed connection {}", conn_id);
            true
        } else {
            false
        }
    }

    // ==================== Activity ====================

    /// Record one served request
    ///
    /// Bumps the activity timestamp, increments the request counter, and
    /// records the declared identity string on first sight.
    pub fn touch(&self, conn_id: ConnId, identity: Option<&str>) -> bool {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.last_activity = Instant::now();
            entry.requests += 1;
            entry.state = entry.state.transition(ConnEvent::RequestServed);
            if entry.client_identity.is_none() {
                if let Some(identity) = identity {
                    entry.client_identity = Some(identity.to_string());
                }
            }
            true
        } else {
            false
        }
    }

    /// Mark a connection as parked between requests
    pub fn mark_waiting(&self, conn_id: ConnId) {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.state = entry.state.transition(ConnEvent::WentIdle);
        }
    }

    /// Mark a connection as failed at the transport layer
    pub fn mark_failed(&self, conn_id: ConnId) {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.state = entry.state.transition(ConnEvent::TransportFailed);
        }
    }

    // ==================== Reclamation ====================

    /// Ask a connection's worker to shut down
    pub fn request_close(&self, conn_id: ConnId) -> bool {
        let close_tx = match self.connections.get_mut(&conn_id) {
            Some(mut entry) => {
                entry.state = entry.state.transition(ConnEvent::CloseRequested);
                entry.close_tx.clone()
            }
            None => return false,
        };
        // Send outside the map reference; a full or closed channel just
        // means the worker is already on its way out.
        let _ = close_tx.try_send(());
        true
    }

    /// Ask every worker to shut down
    pub fn close_all(&self) {
        let ids: Vec<ConnId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.request_close(id);
        }
    }

    /// Connections eligible for reclamation: idle beyond the threshold,
    /// transport-dead, or stuck in a terminal state
    pub fn reclaimable(&self, idle_after: Duration) -> Vec<ConnId> {
        self.connections
            .iter()
            .filter(|entry| {
                entry.last_activity.elapsed() > idle_after
                    || entry.close_tx.is_closed()
                    || entry.state.is_terminal()
            })
            .map(|entry| *entry.key())
            .collect()
    }

    // ==================== Introspection ====================

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_connections
    }

    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.connections.contains_key(&conn_id)
    }

    pub fn get_info(&self, conn_id: ConnId) -> Option<ConnectionInfo> {
        self.connections.get(&conn_id).map(|entry| ConnectionInfo {
            id: conn_id,
            remote: entry.remote.clone(),
            state: entry.state,
            requests: entry.requests,
            client_identity: entry.client_identity.clone(),
        })
    }

    /// Backdate a connection's activity (test hook for reclamation paths)
    #[cfg(test)]
    pub fn backdate(&self, conn_id: ConnId, age: Duration) {
        if let Some(mut entry) = self.connections.get_mut(&conn_id) {
            entry.last_activity = Instant::now() - age;
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("active", &self.connections.len())
            .field("max_connections", &self.max_connections)
            .field("per_endpoint_limit", &self.per_endpoint_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn close_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
        mpsc::channel(1)
    }

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(4, 2)
    }

    // ==================== State machine ====================

    #[test]
    fn test_transition_admission() {
        assert_eq!(
            ConnState::Connecting.transition(ConnEvent::Admitted),
            ConnState::Ready
        );
    }

    #[test]
    fn test_transition_request_cycle() {
        let state = ConnState::Ready.transition(ConnEvent::WentIdle);
        assert_eq!(state, ConnState::Idle);
        assert_eq!(
            state.transition(ConnEvent::RequestServed),
            ConnState::Ready
        );
    }

    #[test]
    fn test_transition_close_path() {
        let state = ConnState::Idle.transition(ConnEvent::CloseRequested);
        assert_eq!(state, ConnState::Closing);
        assert_eq!(
            state.transition(ConnEvent::TransportClosed),
            ConnState::Closed
        );
    }

    #[test]
    fn test_transition_failure_from_any_live_state() {
        for state in [
            ConnState::Connecting,
            ConnState::Ready,
            ConnState::Idle,
            ConnState::Closing,
        ] {
            assert_eq!(
                state.transition(ConnEvent::TransportFailed),
                ConnState::Failed
            );
        }
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        for state in [ConnState::Closed, ConnState::Failed] {
            for event in [
                ConnEvent::Admitted,
                ConnEvent::RequestServed,
                ConnEvent::WentIdle,
                ConnEvent::CloseRequested,
                ConnEvent::TransportClosed,
                ConnEvent::TransportFailed,
            ] {
                assert_eq!(state.transition(event), state);
            }
        }
    }

    // ==================== Admission ====================

    #[test]
    fn test_register_and_remove() {
        let registry = registry();
        let (tx, _rx) = close_channel();

        let id = registry.register("10.0.0.5", tx).unwrap();
        assert_eq!(registry.active_count(), 1);
        assert!(registry.contains(id));

        assert!(registry.remove(id));
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let registry = registry();
        let (tx, _rx) = close_channel();

        let id = registry.register("10.0.0.5", tx).unwrap();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_capacity_ceiling() {
        let registry = ConnectionRegistry::new(2, 2);
        let (tx1, _rx1) = close_channel();
        let (tx2, _rx2) = close_channel();
        let (tx3, _rx3) = close_channel();

        assert!(registry.register("10.0.0.1", tx1).is_some());
        assert!(registry.register("10.0.0.2", tx2).is_some());
        assert!(registry.register("10.0.0.3", tx3).is_none());
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_per_endpoint_limit() {
        let registry = ConnectionRegistry::new(8, 2);
        let (tx1, _rx1) = close_channel();
        let (tx2, _rx2) = close_channel();
        let (tx3, _rx3) = close_channel();
        let (tx4, _rx4) = close_channel();

        assert!(registry.register("10.0.0.5", tx1).is_some());
        assert!(registry.register("10.0.0.5", tx2).is_some());
        // Third from the same endpoint is rejected despite global headroom
        assert!(registry.register("10.0.0.5", tx3).is_none());
        // A different endpoint is still fine
        assert!(registry.register("10.0.0.6", tx4).is_some());
    }

    #[test]
    fn test_remove_frees_endpoint_slot() {
        let registry = ConnectionRegistry::new(8, 1);
        let (tx1, _rx1) = close_channel();
        let (tx2, _rx2) = close_channel();
        let (tx3, _rx3) = close_channel();

        let id = registry.register("10.0.0.5", tx1).unwrap();
        assert!(registry.register("10.0.0.5", tx2).is_none());

        registry.remove(id);
        assert!(registry.register("10.0.0.5", tx3).is_some());
    }

    #[tokio::test]
    async fn test_concurrent_registration_respects_ceiling() {
        let registry = Arc::new(ConnectionRegistry::new(16, 64));
        let mut handles = Vec::new();

        for i in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                // Keep the receiver alive for the duration of the test by
                // leaking it; admission accounting is what's under test.
                std::mem::forget(_rx);
                registry.register(&format!("10.0.{}.1", i % 4), tx)
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 16);
        assert_eq!(registry.active_count(), 16);
    }

    // ==================== Activity ====================

    #[test]
    fn test_touch_updates_entry() {
        let registry = registry();
        let (tx, _rx) = close_channel();
        let id = registry.register("10.0.0.5", tx).unwrap();

        assert!(registry.touch(id, Some("StageView/2.1")));
        assert!(registry.touch(id, Some("SomethingElse")));

        let info = registry.get_info(id).unwrap();
        assert_eq!(info.requests, 2);
        assert_eq!(info.state, ConnState::Ready);
        // Identity sticks to the first value seen
        assert_eq!(info.client_identity.as_deref(), Some("StageView/2.1"));
    }

    #[test]
    fn test_touch_unknown_connection() {
        let registry = registry();
        assert!(!registry.touch(ConnId::new(999), None));
    }

    #[test]
    fn test_mark_waiting_transitions_to_idle() {
        let registry = registry();
        let (tx, _rx) = close_channel();
        let id = registry.register("10.0.0.5", tx).unwrap();

        registry.mark_waiting(id);
        assert_eq!(registry.get_info(id).unwrap().state, ConnState::Idle);

        registry.touch(id, None);
        assert_eq!(registry.get_info(id).unwrap().state, ConnState::Ready);
    }

    // ==================== Reclamation ====================

    #[tokio::test]
    async fn test_request_close_signals_worker() {
        let registry = registry();
        let (tx, mut rx) = close_channel();
        let id = registry.register("10.0.0.5", tx).unwrap();

        assert!(registry.request_close(id));
        assert_eq!(registry.get_info(id).unwrap().state, ConnState::Closing);
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_request_close_unknown_connection() {
        let registry = registry();
        assert!(!registry.request_close(ConnId::new(999)));
    }

    #[test]
    fn test_reclaimable_finds_idle_connections() {
        let registry = registry();
        let (tx1, _rx1) = close_channel();
        let (tx2, _rx2) = close_channel();

        let stale = registry.register("10.0.0.5", tx1).unwrap();
        let fresh = registry.register("10.0.0.6", tx2).unwrap();
        registry.backdate(stale, Duration::from_secs(600));

        let found = registry.reclaimable(Duration::from_secs(180));
        assert_eq!(found, vec![stale]);
        assert!(!found.contains(&fresh));
    }

    #[test]
    fn test_reclaimable_finds_dead_transport() {
        let registry = registry();
        let (tx, rx) = close_channel();
        let id = registry.register("10.0.0.5", tx).unwrap();

        // Worker gone: receiver dropped
        drop(rx);

        let found = registry.reclaimable(Duration::from_secs(180));
        assert_eq!(found, vec![id]);
    }

    #[test]
    fn test_close_all() {
        let registry = registry();
        let (tx1, mut rx1) = close_channel();
        let (tx2, mut rx2) = close_channel();

        registry.register("10.0.0.5", tx1).unwrap();
        registry.register("10.0.0.6", tx2).unwrap();

        registry.close_all();
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_registry_debug() {
        let registry = registry();
        let debug = format!("{:?}", registry);
        assert!(debug.contains("ConnectionRegistry"));
        assert!(debug.contains("max_connections"));
    }
}
