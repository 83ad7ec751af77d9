//! Periodic reclamation and load reporting
//!
//! Two independent background tasks, deliberately decoupled from request
//! traffic: the reclaim pass closes dead or idle connections and demotes
//! stale sessions; the report pass only logs. A failed tick never stops the
//! loop, and both exit on the shutdown broadcast.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::registry::ConnectionRegistry;
use crate::sessions::SessionTracker;

/// Timing parameters for the reclaim pass
#[derive(Debug, Clone, Copy)]
pub struct ReclaimParams {
    pub interval: Duration,
    pub connection_idle: Duration,
    pub session_timeout: Duration,
}

/// Run the reclamation loop until shutdown
pub async fn run_reclaim_loop(
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionTracker>,
    params: ReclaimParams,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(params.interval) => {
                reclaim_pass(&registry, &sessions, params);
            }
            _ = shutdown_rx.recv() => {
                debug!("Reclaim loop stopped");
                break;
            }
        }
    }
}

/// One best-effort reclamation pass
///
/// Operates on a snapshot of the registries; anything that slips through
/// re-qualifies on the next pass.
fn reclaim_pass(
    registry: &ConnectionRegistry,
    sessions: &SessionTracker,
    params: ReclaimParams,
) {
    let stale = registry.reclaimable(params.connection_idle);
    for conn_id in stale {
        registry.request_close(conn_id);
        registry.remove(conn_id);
        debug!("Reclaimed connection {}", conn_id);
    }

    let demoted = sessions.demote_stale(params.session_timeout);
    if !demoted.is_empty() {
        debug!("Demoted {} idle sessions", demoted.len());
    }
}

/// Run the load-summary loop until shutdown
///
/// Observability only; this task never mutates the registries.
pub async fn run_report_loop(
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<SessionTracker>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                info!(
                    connections = registry.active_count(),
                    capacity = registry.capacity(),
                    active_sessions = sessions.active_count(),
                    inactive_sessions = sessions.inactive_count(),
                    "load summary"
                );
            }
            _ = shutdown_rx.recv() => {
                debug!("Report loop stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn params() -> ReclaimParams {
        ReclaimParams {
            interval: Duration::from_secs(30),
            connection_idle: Duration::from_secs(180),
            session_timeout: Duration::from_secs(15),
        }
    }

    #[tokio::test]
    async fn test_reclaim_pass_removes_idle_connection() {
        let registry = ConnectionRegistry::new(4, 2);
        let sessions = SessionTracker::new();

        let (tx, mut rx) = mpsc::channel(1);
        let id = registry.register("10.0.0.5", tx).unwrap();
        registry.backdate(id, Duration::from_secs(600));

        reclaim_pass(&registry, &sessions, params());

        assert!(!registry.contains(id));
        // The worker was asked to shut down before removal
        assert!(rx.try_recv().is_ok());
        // A later lookup of the reclaimed identity finds nothing
        assert!(registry.get_info(id).is_none());
    }

    #[tokio::test]
    async fn test_reclaim_pass_keeps_fresh_connection() {
        let registry = ConnectionRegistry::new(4, 2);
        let sessions = SessionTracker::new();

        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register("10.0.0.5", tx).unwrap();

        reclaim_pass(&registry, &sessions, params());

        assert!(registry.contains(id));
    }

    #[tokio::test]
    async fn test_reclaim_pass_demotes_stale_session() {
        use crate::registry::ConnId;

        let registry = ConnectionRegistry::new(4, 2);
        let sessions = SessionTracker::new();

        sessions.observe("10.0.0.5", "TestAgent", ConnId::new(1));
        sessions.backdate_active("10.0.0.5", "TestAgent", Duration::from_secs(60));

        reclaim_pass(&registry, &sessions, params());

        assert_eq!(sessions.active_count(), 0);
        assert_eq!(sessions.inactive_count(), 1);
    }

    #[tokio::test]
    async fn test_loops_stop_on_shutdown() {
        let registry = Arc::new(ConnectionRegistry::new(4, 2));
        let sessions = Arc::new(SessionTracker::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        let reclaim = tokio::spawn(run_reclaim_loop(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            params(),
            shutdown_tx.subscribe(),
        ));
        let report = tokio::spawn(run_report_loop(
            registry,
            sessions,
            Duration::from_secs(60),
            shutdown_tx.subscribe(),
        ));

        let _ = shutdown_tx.send(());

        tokio::time::timeout(Duration::from_secs(1), reclaim)
            .await
            .expect("reclaim loop did not stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), report)
            .await
            .expect("report loop did not stop")
            .unwrap();
    }
}
