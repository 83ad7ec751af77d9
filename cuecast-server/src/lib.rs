//! cuecast-server: Embedded local-network cue-list distribution server
//!
//! The host application owns the cue document; this crate serves a
//! read-only view of it to phones, tablets, and browsers polling over the
//! local network. [`CueServer`] is the host-facing handle: start and stop
//! the listener, replace the served snapshot, and introspect connections
//! and device sessions for the operator monitoring view.

pub mod accept;
pub mod assets;
pub mod config;
pub mod housekeeping;
pub mod registry;
pub mod router;
pub mod sessions;
pub mod snapshot;

pub use config::{ConfigLoader, HousekeepingConfig, LimitsConfig, ServerConfig};
pub use sessions::SessionView;
pub use snapshot::{ClockState, Column, CueRow, HighlightRule, Snapshot};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use cuecast_utils::{CuecastError, Result};

use accept::SharedState;
use housekeeping::ReclaimParams;
use registry::ConnectionRegistry;
use sessions::SessionTracker;
use snapshot::SnapshotStore;

/// Host-application-facing server handle
///
/// All state lives behind `Arc`s shared with the spawned tasks, so the
/// handle itself stays cheap to hold wherever the host keeps it.
pub struct CueServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionTracker>,
    snapshot: Arc<SnapshotStore>,
    shutdown_tx: broadcast::Sender<()>,
    running: Mutex<Option<SocketAddr>>,
}

impl CueServer {
    /// Construct shared state; no I/O happens until [`start`](Self::start)
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            registry: Arc::new(ConnectionRegistry::new(
                config.limits.max_connections,
                config.limits.per_endpoint_limit,
            )),
            sessions: Arc::new(SessionTracker::new()),
            snapshot: Arc::new(SnapshotStore::new()),
            shutdown_tx,
            running: Mutex::new(None),
            config,
        }
    }

    /// Bind the listener and spawn the accept loop and housekeeping tasks
    ///
    /// Returns the bound address, which is how callers learn the real port
    /// when asking for port 0.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        if let Some(addr) = *self.running.lock() {
            return Err(CuecastError::AlreadyRunning {
                addr: addr.to_string(),
            });
        }

        let bind = format!("{}:{}", self.config.bind_addr, port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|e| CuecastError::Bind {
                addr: bind.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        *self.running.lock() = Some(local_addr);

        let state = SharedState {
            registry: Arc::clone(&self.registry),
            sessions: Arc::clone(&self.sessions),
            snapshot: Arc::clone(&self.snapshot),
            shutdown_tx: self.shutdown_tx.clone(),
        };

        tokio::spawn(accept::run_accept_loop(listener, state));

        tokio::spawn(housekeeping::run_reclaim_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.sessions),
            ReclaimParams {
                interval: Duration::from_secs(self.config.housekeeping.reclaim_interval_secs),
                connection_idle: Duration::from_secs(self.config.limits.connection_idle_secs),
                session_timeout: Duration::from_secs(self.config.limits.session_timeout_secs),
            },
            self.shutdown_tx.subscribe(),
        ));

        tokio::spawn(housekeeping::run_report_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.sessions),
            Duration::from_secs(self.config.housekeeping.report_interval_secs),
            self.shutdown_tx.subscribe(),
        ));

        info!("Cue server started on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop the listener and close every live connection
    ///
    /// Safe to call when not running; sessions and the snapshot survive a
    /// stop so a later start resumes with the same state.
    pub fn stop(&self) {
        if self.running.lock().take().is_some() {
            let _ = self.shutdown_tx.send(());
            self.registry.close_all();
            info!("Cue server stopped");
        }
    }

    /// Swap in a complete new snapshot; called on every document change
    pub fn replace_snapshot(&self, snapshot: Snapshot) {
        self.snapshot.replace(snapshot);
    }

    /// (active, maximum) connection counts for the monitoring view
    pub fn connection_stats(&self) -> (usize, usize) {
        (self.registry.active_count(), self.registry.capacity())
    }

    /// Devices currently polling, in stable display order
    pub fn active_sessions(&self) -> Vec<SessionView> {
        self.sessions.list_active()
    }

    /// Devices seen earlier this run, in stable display order
    pub fn inactive_sessions(&self) -> Vec<SessionView> {
        self.sessions.list_inactive()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.running.lock()
    }
}

impl std::fmt::Debug for CueServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueServer")
            .field("running", &self.local_addr())
            .field("connections", &self.registry.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_and_stop() {
        let server = CueServer::new(ServerConfig::default());
        assert!(!server.is_running());

        let addr = server.start(0).await.unwrap();
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(server.connection_stats(), (0, 32));

        server.stop();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_an_error() {
        let server = CueServer::new(ServerConfig::default());
        server.start(0).await.unwrap();

        let result = server.start(0).await;
        assert!(matches!(result, Err(CuecastError::AlreadyRunning { .. })));

        server.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let server = CueServer::new(ServerConfig::default());
        server.start(0).await.unwrap();
        server.stop();

        let addr = server.start(0).await.unwrap();
        assert!(server.is_running());
        assert_ne!(addr.port(), 0);

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_harmless() {
        let server = CueServer::new(ServerConfig::default());
        server.stop();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_snapshot_visible_through_handle() {
        let server = CueServer::new(ServerConfig::default());

        let mut snapshot = Snapshot::default();
        snapshot.cue_stack_name = "Tech Rehearsal".into();
        server.replace_snapshot(snapshot);

        assert_eq!(server.snapshot.read().cue_stack_name, "Tech Rehearsal");
    }
}
