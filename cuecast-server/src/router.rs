//! Request routing and endpoint handlers
//!
//! Matching is exact on (method, path); the endpoint set is small and fixed,
//! so there is no pattern routing. The `/cues` handler is also the point
//! where passive polling keeps a device session alive.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use cuecast_protocol::{Method, Request, Response};

use crate::assets;
use crate::registry::ConnId;
use crate::sessions::SessionTracker;
use crate::snapshot::{Column, CueRow, HighlightRule, SnapshotStore};

/// Identity reported for clients that declare nothing
const UNKNOWN_IDENTITY: &str = "unknown";

/// Shared state the handlers read
pub struct RouterContext {
    snapshot: Arc<SnapshotStore>,
    sessions: Arc<SessionTracker>,
}

/// The `/cues` payload, field names fixed by the viewer contract
#[derive(Serialize)]
struct CuesPayload<'a> {
    #[serde(rename = "cueStackName")]
    cue_stack_name: &'a str,
    columns: &'a [Column],
    cues: &'a [CueRow],
    #[serde(rename = "activeCueIndex")]
    active_cue_index: i64,
    #[serde(rename = "selectedCueIndex")]
    selected_cue_index: i64,
    #[serde(rename = "lastUpdateTime")]
    last_update_time: u64,
    #[serde(rename = "currentDate")]
    current_date: String,
    #[serde(rename = "currentTime")]
    current_time: String,
    #[serde(rename = "currentAMPM")]
    current_ampm: String,
    #[serde(rename = "countdownTime")]
    countdown_time: i64,
    #[serde(rename = "countUpTime")]
    count_up_time: i64,
    #[serde(rename = "countdownRunning")]
    countdown_running: bool,
    #[serde(rename = "countUpRunning")]
    count_up_running: bool,
    #[serde(rename = "highlightColors")]
    highlight_colors: &'a [HighlightRule],
}

impl RouterContext {
    pub fn new(snapshot: Arc<SnapshotStore>, sessions: Arc<SessionTracker>) -> Self {
        Self { snapshot, sessions }
    }

    /// Produce the response for one decoded request
    ///
    /// `remote` is the peer address without port, which doubles as the
    /// session source address.
    pub fn route(&self, request: &Request, remote: &str, conn_id: ConnId) -> Response {
        // Preflight is answered uniformly regardless of path
        if request.method == Method::Options {
            return Response::no_content();
        }

        match (request.method, request.path.as_str()) {
            (Method::Get, "/") => Response::html(assets::INDEX_HTML),
            (Method::Get, "/cues") => self.handle_cues(request, remote, conn_id),
            (Method::Get, "/health") => Response::text("OK"),
            (Method::Get, path) => match assets::lookup(path) {
                Some(asset) => Response::ok(asset.content_type, asset.body.as_bytes().to_vec()),
                None => Response::not_found(),
            },
            _ => Response::not_found(),
        }
    }

    fn handle_cues(&self, request: &Request, remote: &str, conn_id: ConnId) -> Response {
        let identity = request.user_agent().unwrap_or(UNKNOWN_IDENTITY);
        self.sessions.observe(remote, identity, conn_id);

        let snapshot = self.snapshot.read();
        let now = chrono::Local::now();
        let payload = CuesPayload {
            cue_stack_name: &snapshot.cue_stack_name,
            columns: &snapshot.columns,
            cues: &snapshot.cues,
            active_cue_index: snapshot.active_cue_index,
            selected_cue_index: snapshot.selected_cue_index,
            last_update_time: snapshot.last_update_time,
            current_date: now.format("%m/%d/%Y").to_string(),
            current_time: now.format("%I:%M:%S").to_string(),
            current_ampm: now.format("%p").to_string(),
            countdown_time: snapshot.clock.countdown_seconds,
            count_up_time: snapshot.clock.count_up_seconds,
            countdown_running: snapshot.clock.countdown_running,
            count_up_running: snapshot.clock.count_up_running,
            highlight_colors: &snapshot.highlight_rules,
        };

        match serde_json::to_string(&payload) {
            Ok(body) => Response::json(body),
            Err(e) => {
                warn!("Failed to serialize cue payload: {}", e);
                Response::server_error()
            }
        }
    }
}
