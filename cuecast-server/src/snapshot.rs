//! Live cue-list snapshot model and store
//!
//! The host application replaces the whole snapshot on every document
//! change; request handlers only ever read. Storage is an [`ArcSwap`] so a
//! reader always observes either the fully-old or fully-new value, never a
//! mix.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

/// One display column of the cue table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub width: f64,
}

/// One cue row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueRow {
    pub index: usize,
    /// Field values, one per column
    pub values: Vec<String>,
    pub timer_value: String,
    /// Struck-through flags, one per column
    pub struck: Vec<bool>,
}

/// Keyword-to-color highlight rule
///
/// `color` is six hex digits without a prefix, as the viewer page expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightRule {
    pub keyword: String,
    pub color: String,
}

/// Show-clock counters driven by the host application
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub countdown_seconds: i64,
    pub count_up_seconds: i64,
    pub countdown_running: bool,
    pub count_up_running: bool,
}

/// The complete served view of application state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cue_stack_name: String,
    pub columns: Vec<Column>,
    pub cues: Vec<CueRow>,
    pub active_cue_index: i64,
    pub selected_cue_index: i64,
    pub highlight_rules: Vec<HighlightRule>,
    pub clock: ClockState,
    /// Unix seconds of the last replacement, stamped by the store
    pub last_update_time: u64,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            cue_stack_name: String::new(),
            columns: Vec::new(),
            cues: Vec::new(),
            active_cue_index: -1,
            selected_cue_index: -1,
            highlight_rules: Vec::new(),
            clock: ClockState::default(),
            last_update_time: 0,
        }
    }
}

/// Atomically replaceable snapshot storage
///
/// `replace` is the only write path; there is no field-level mutation API.
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Swap in a complete new snapshot
    pub fn replace(&self, mut snapshot: Snapshot) {
        snapshot.last_update_time = unix_now();
        self.current.store(Arc::new(snapshot));
    }

    /// A consistent point-in-time view
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            cue_stack_name: "Act One".into(),
            columns: vec![
                Column {
                    name: "Cue".into(),
                    width: 80.0,
                },
                Column {
                    name: "Action".into(),
                    width: 240.0,
                },
            ],
            cues: vec![CueRow {
                index: 0,
                values: vec!["1".into(), "House to half".into()],
                timer_value: "00:30".into(),
                struck: vec![false, false],
            }],
            active_cue_index: 0,
            selected_cue_index: 0,
            highlight_rules: vec![HighlightRule {
                keyword: "WARN".into(),
                color: "ffcc00".into(),
            }],
            clock: ClockState {
                countdown_seconds: 600,
                count_up_seconds: 0,
                countdown_running: true,
                count_up_running: false,
            },
            last_update_time: 0,
        }
    }

    #[test]
    fn test_default_snapshot_has_no_selection() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.active_cue_index, -1);
        assert_eq!(snapshot.selected_cue_index, -1);
        assert!(snapshot.cues.is_empty());
    }

    #[test]
    fn test_store_starts_with_default() {
        let store = SnapshotStore::new();
        assert_eq!(*store.read(), Snapshot::default());
    }

    #[test]
    fn test_replace_is_whole_value() {
        let store = SnapshotStore::new();
        store.replace(sample_snapshot());

        let view = store.read();
        assert_eq!(view.cue_stack_name, "Act One");
        assert_eq!(view.columns.len(), 2);
        assert!(view.last_update_time > 0);
    }

    #[test]
    fn test_reader_keeps_old_view_across_replace() {
        let store = SnapshotStore::new();
        store.replace(sample_snapshot());

        let before = store.read();
        let mut updated = sample_snapshot();
        updated.cue_stack_name = "Act Two".into();
        store.replace(updated);

        // The earlier Arc still points at the complete old value
        assert_eq!(before.cue_stack_name, "Act One");
        assert_eq!(store.read().cue_stack_name, "Act Two");
    }

    #[test]
    fn test_concurrent_readers_never_see_a_mix() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let store = Arc::new(SnapshotStore::new());
        store.replace(sample_snapshot());

        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let store = Arc::clone(&store);
            let stop = Arc::clone(&stop);
            handles.push(std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let view = store.read();
                    // Name and column count travel together in every version
                    match view.cue_stack_name.as_str() {
                        "Act One" => assert_eq!(view.columns.len(), 2),
                        "Act Two" => assert_eq!(view.columns.len(), 3),
                        other => panic!("unexpected snapshot name {other:?}"),
                    }
                }
            }));
        }

        for _ in 0..500 {
            let mut a = sample_snapshot();
            a.cue_stack_name = "Act Two".into();
            a.columns.push(Column {
                name: "Notes".into(),
                width: 120.0,
            });
            store.replace(a);
            store.replace(sample_snapshot());
        }

        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(sample_snapshot()).unwrap();
        assert_eq!(json["cueStackName"], "Act One");
        assert_eq!(json["cues"][0]["timerValue"], "00:30");
        assert_eq!(json["activeCueIndex"], 0);
    }
}
