//! TCP accept loop and per-connection workers
//!
//! The accept loop applies admission control and hands each admitted stream
//! to its own worker task. A worker owns the framed stream for the life of
//! the connection, serving requests strictly in arrival order, and is
//! unblocked from its read wait by the close signal or the shutdown
//! broadcast.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use cuecast_protocol::{HttpCodec, Response};

use crate::registry::{ConnId, ConnectionRegistry};
use crate::router::RouterContext;
use crate::sessions::SessionTracker;
use crate::snapshot::SnapshotStore;

/// State shared by the accept loop and every worker
#[derive(Clone)]
pub struct SharedState {
    pub registry: Arc<ConnectionRegistry>,
    pub sessions: Arc<SessionTracker>,
    pub snapshot: Arc<SnapshotStore>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Run the accept loop until shutdown
pub async fn run_accept_loop(listener: TcpListener, state: SharedState) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        let endpoint = peer_addr.ip().to_string();
                        let (close_tx, close_rx) = mpsc::channel(1);

                        match state.registry.register(&endpoint, close_tx) {
                            Some(conn_id) => {
                                debug!("Connection {} admitted from {}", conn_id, peer_addr);
                                let state = state.clone();
                                tokio::spawn(async move {
                                    serve_connection(stream, conn_id, endpoint, state, close_rx)
                                        .await;
                                });
                            }
                            None => {
                                // Admission rejection is not an error; the
                                // stream is simply dropped.
                                debug!("Connection from {} rejected at admission", peer_addr);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping accept loop");
                break;
            }
        }
    }
}

/// Serve one connection until it closes, fails, or is told to stop
async fn serve_connection(
    stream: TcpStream,
    conn_id: ConnId,
    endpoint: String,
    state: SharedState,
    mut close_rx: mpsc::Receiver<()>,
) {
    let router = RouterContext::new(Arc::clone(&state.snapshot), Arc::clone(&state.sessions));
    let mut framed = Framed::new(stream, HttpCodec::new());
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        state.registry.mark_waiting(conn_id);

        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(request)) => {
                        state.registry.touch(conn_id, request.user_agent());
                        let response = router.route(&request, &endpoint, conn_id);
                        if let Err(e) = framed.send(response).await {
                            debug!("Send failed on {}: {}", conn_id, e);
                            state.registry.mark_failed(conn_id);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        // A malformed request gets a generic error response
                        // and the connection stays eligible for reuse.
                        warn!("Decode failure on {}: {}", conn_id, e);
                        let recoverable = e.is_recoverable();
                        if framed.send(Response::server_error()).await.is_err() || !recoverable {
                            state.registry.mark_failed(conn_id);
                            break;
                        }
                    }
                    None => {
                        debug!("Connection {} closed by peer", conn_id);
                        break;
                    }
                }
            }
            _ = close_rx.recv() => {
                debug!("Connection {} closing on request", conn_id);
                break;
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    // No-op if housekeeping got here first
    state.registry.remove(conn_id);
}
