//! Logical client-device session tracking
//!
//! A session identifies the device behind the traffic, keyed by source
//! address plus declared identity string, and deliberately outlives any
//! single connection: a polling device opens and closes connections far
//! more often than a human actually leaves the room. Only the housekeeping
//! timeout moves a session to the inactive set.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::registry::ConnId;

/// Upper bound on retained inactive sessions; oldest-first-seen entries are
/// evicted past this point so the history view cannot grow without bound
/// over a long-running process.
pub const MAX_INACTIVE_SESSIONS: usize = 512;

/// Key identifying one logical device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub addr: String,
    pub identity: String,
}

/// Device category derived from the declared identity string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Phone,
    Tablet,
    Computer,
    Unknown,
}

/// One tracked device session
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Diagnostic identity for logs; the map key is what identifies the
    /// device
    pub id: Uuid,
    pub key: SessionKey,
    pub category: DeviceCategory,
    pub browser: String,
    pub device_name: String,
    /// Connection that most recently carried this session's traffic
    pub last_conn: ConnId,
    pub first_seen: Instant,
    pub first_seen_unix: u64,
    pub last_seen: Instant,
}

/// Serializable snapshot of one session for the monitoring view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub addr: String,
    pub identity: String,
    pub category: DeviceCategory,
    pub browser: String,
    pub device_name: String,
    pub first_seen_unix: u64,
    pub idle_secs: u64,
}

impl ClientSession {
    fn to_view(&self) -> SessionView {
        SessionView {
            addr: self.key.addr.clone(),
            identity: self.key.identity.clone(),
            category: self.category,
            browser: self.browser.clone(),
            device_name: self.device_name.clone(),
            first_seen_unix: self.first_seen_unix,
            idle_secs: self.last_seen.elapsed().as_secs(),
        }
    }
}

struct TrackerInner {
    active: HashMap<SessionKey, ClientSession>,
    inactive: HashMap<SessionKey, ClientSession>,
}

/// Tracker for active and inactive device sessions
///
/// All mutation goes through these methods; the single mutex is the
/// synchronization boundary, callers never coordinate locking themselves.
pub struct SessionTracker {
    inner: Mutex<TrackerInner>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                active: HashMap::new(),
                inactive: HashMap::new(),
            }),
        }
    }

    /// Record one sighting of a device
    ///
    /// First sight creates an active session; repeat sight bumps last-seen;
    /// a key resting in the inactive set is moved out before reactivation so
    /// it can never appear in both sets or twice in one.
    pub fn observe(&self, addr: &str, identity: &str, conn_id: ConnId) {
        let key = SessionKey {
            addr: addr.to_string(),
            identity: identity.to_string(),
        };

        let mut inner = self.inner.lock();

        if let Some(session) = inner.active.get_mut(&key) {
            session.last_seen = Instant::now();
            session.last_conn = conn_id;
            return;
        }

        if let Some(mut session) = inner.inactive.remove(&key) {
            session.last_seen = Instant::now();
            session.last_conn = conn_id;
            debug!(
                "Session {} from {} reactivated",
                session.device_name, session.key.addr
            );
            inner.active.insert(key, session);
            return;
        }

        let (category, browser, device_name) = classify(identity);
        let now = Instant::now();
        let session = ClientSession {
            id: Uuid::new_v4(),
            key: key.clone(),
            category,
            browser,
            device_name,
            last_conn: conn_id,
            first_seen: now,
            first_seen_unix: unix_now(),
            last_seen: now,
        };
        info!(
            "New client session: {} ({}) from {}",
            session.device_name, session.browser, addr
        );
        inner.active.insert(key, session);
    }

    /// Move sessions idle past the timeout to the inactive set
    ///
    /// Returns the demoted keys. The move preserves the session record, so
    /// a later sighting of the same key reactivates it with its original
    /// first-seen time.
    pub fn demote_stale(&self, timeout: Duration) -> Vec<SessionKey> {
        let mut inner = self.inner.lock();

        let stale: Vec<SessionKey> = inner
            .active
            .iter()
            .filter(|(_, session)| session.last_seen.elapsed() > timeout)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(session) = inner.active.remove(key) {
                debug!(
                    "Session {} from {} went inactive",
                    session.device_name, session.key.addr
                );
                inner.inactive.insert(key.clone(), session);
            }
        }

        // Retention cap on the history view
        while inner.inactive.len() > MAX_INACTIVE_SESSIONS {
            let oldest = inner
                .inactive
                .iter()
                .min_by_key(|(_, session)| session.first_seen)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    inner.inactive.remove(&key);
                }
                None => break,
            }
        }

        stale
    }

    /// Active sessions, ordered by first-seen then address
    pub fn list_active(&self) -> Vec<SessionView> {
        Self::ordered_views(&self.inner.lock().active)
    }

    /// Inactive sessions, same ordering as the active listing
    pub fn list_inactive(&self) -> Vec<SessionView> {
        Self::ordered_views(&self.inner.lock().inactive)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn inactive_count(&self) -> usize {
        self.inner.lock().inactive.len()
    }

    fn ordered_views(sessions: &HashMap<SessionKey, ClientSession>) -> Vec<SessionView> {
        let mut sessions: Vec<&ClientSession> = sessions.values().collect();
        sessions.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.key.addr.cmp(&b.key.addr))
        });
        sessions.into_iter().map(|s| s.to_view()).collect()
    }

    /// Backdate an active session (test hook for the demotion path)
    #[cfg(test)]
    pub fn backdate_active(&self, addr: &str, identity: &str, age: Duration) {
        let key = SessionKey {
            addr: addr.to_string(),
            identity: identity.to_string(),
        };
        if let Some(session) = self.inner.lock().active.get_mut(&key) {
            session.last_seen = Instant::now() - age;
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SessionTracker")
            .field("active", &inner.active.len())
            .field("inactive", &inner.inactive.len())
            .finish()
    }
}

/// Derive device category, browser family, and a display name from the
/// declared identity string
fn classify(identity: &str) -> (DeviceCategory, String, String) {
    let category = if identity.contains("iPhone")
        || (identity.contains("Android") && identity.contains("Mobile"))
    {
        DeviceCategory::Phone
    } else if identity.contains("iPad") || identity.contains("Tablet") {
        DeviceCategory::Tablet
    } else if identity.contains("Macintosh")
        || identity.contains("Windows")
        || identity.contains("X11")
        || identity.contains("Linux")
    {
        DeviceCategory::Computer
    } else {
        DeviceCategory::Unknown
    };

    let browser = if identity.contains("Edg") {
        "Edge"
    } else if identity.contains("OPR") || identity.contains("Opera") {
        "Opera"
    } else if identity.contains("Firefox") || identity.contains("FxiOS") {
        "Firefox"
    } else if identity.contains("Chrome") || identity.contains("CriOS") {
        "Chrome"
    } else if identity.contains("Safari") {
        "Safari"
    } else {
        "Unknown"
    };

    let device_name = if identity.contains("iPhone") {
        "iPhone"
    } else if identity.contains("iPad") {
        "iPad"
    } else if identity.contains("Android") {
        "Android device"
    } else if identity.contains("Macintosh") {
        "Mac"
    } else if identity.contains("Windows") {
        "Windows PC"
    } else if identity.contains("X11") || identity.contains("Linux") {
        "Linux machine"
    } else {
        "Unknown device"
    };

    (category, browser.to_string(), device_name.to_string())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
