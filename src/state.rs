//! Snapshot timeline
//!
//! Captured states form an ordered timeline with an integer cursor.
//! Navigation moves the cursor and restores a deep copy of the targeted
//! snapshot's data; it never mutates snapshot data. Snapshot ids
//! (`snapshot_N`) are monotone, list order equals capture order, and the
//! timeline is head-trimmed over its capacity with bookmarks keeping ids.

use crate::config;
use crate::error::{MysticError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Export format version
const EXPORT_VERSION: u32 = 1;

/// Deepest structure preserved by [`StateManager::capture_serialize`];
/// anything deeper is replaced by its repr.
pub const MAX_CAPTURE_DEPTH: usize = 32;

/// What a snapshot captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Variable,
    FnArgs,
    FnReturn,
    Exception,
    Global,
    Local,
}

/// One captured state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotone id, `snapshot_N`
    pub id: String,
    /// Capture sequence number
    pub seq: u64,
    /// Capture timestamp
    pub ts: DateTime<Utc>,
    /// Function the capture belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    /// Source line, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Capture kind
    pub kind: SnapshotKind,
    /// Captured data, already JSON
    pub data: Value,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

struct TimelineState {
    snapshots: Vec<Snapshot>,
    cursor: Option<usize>,
    bookmarks: HashMap<String, String>,
    next_seq: u64,
    current_state: Option<Value>,
}

type WatcherFn = Box<dyn Fn(&Snapshot) + Send + Sync>;
type BreakpointFn = Box<dyn Fn(&Snapshot) + Send + Sync>;

struct Breakpoint {
    function: String,
    line: u32,
    callback: BreakpointFn,
}

/// Snapshot store with navigation, diffing, bookmarks and export
pub struct StateManager {
    max_snapshots: usize,
    timeline: Mutex<TimelineState>,
    watchers: Mutex<Vec<WatcherFn>>,
    breakpoints: Mutex<Vec<Breakpoint>>,
}

impl StateManager {
    /// Create a manager with the configured capacity
    pub fn new() -> Self {
        Self::with_capacity(config::config().max_snapshots)
    }

    /// Create a manager with an explicit capacity
    pub fn with_capacity(max_snapshots: usize) -> Self {
        Self {
            max_snapshots: max_snapshots.max(1),
            timeline: Mutex::new(TimelineState {
                snapshots: Vec::new(),
                cursor: None,
                bookmarks: HashMap::new(),
                next_seq: 0,
                current_state: None,
            }),
            watchers: Mutex::new(Vec::new()),
            breakpoints: Mutex::new(Vec::new()),
        }
    }

    /// Capture a JSON state. Returns the snapshot id; watchers and matching
    /// breakpoints fire after the timeline is updated.
    pub fn capture(
        &self,
        kind: SnapshotKind,
        data: Value,
        function_name: Option<&str>,
        line: Option<u32>,
        metadata: Map<String, Value>,
    ) -> String {
        let snapshot = {
            let mut state = self.timeline.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            let snapshot = Snapshot {
                id: format!("snapshot_{seq}"),
                seq,
                ts: Utc::now(),
                function_name: function_name.map(str::to_string),
                line,
                kind,
                data,
                metadata,
            };
            state.snapshots.push(snapshot.clone());
            if state.snapshots.len() > self.max_snapshots {
                state.snapshots.remove(0);
            }
            // Capture moves the cursor to the newest state.
            state.cursor = Some(state.snapshots.len() - 1);
            state.current_state = Some(snapshot.data.clone());
            snapshot
        };

        // Observers run outside the lock so a watcher may capture again.
        for watcher in self.watchers.lock().iter() {
            let _ = catch_unwind(AssertUnwindSafe(|| watcher(&snapshot)));
        }
        if let (Some(function), Some(line)) = (&snapshot.function_name, snapshot.line) {
            for bp in self.breakpoints.lock().iter() {
                if bp.function == *function && bp.line == line {
                    let _ = catch_unwind(AssertUnwindSafe(|| (bp.callback)(&snapshot)));
                }
            }
        }
        snapshot.id
    }

    /// Capture any serializable value, falling back to a
    /// `{type_name, repr}` object when serialization fails, and truncating
    /// structure below [`MAX_CAPTURE_DEPTH`].
    pub fn capture_serialize<T: Serialize + std::fmt::Debug>(
        &self,
        kind: SnapshotKind,
        value: &T,
        function_name: Option<&str>,
        line: Option<u32>,
    ) -> String {
        let data = match serde_json::to_value(value) {
            Ok(json) => clamp_depth(json, MAX_CAPTURE_DEPTH),
            Err(_) => json!({
                "type_name": std::any::type_name::<T>(),
                "repr": format!("{value:?}"),
            }),
        };
        self.capture(kind, data, function_name, line, Map::new())
    }

    /// Snapshot by id
    pub fn get(&self, id: &str) -> Option<Snapshot> {
        let state = self.timeline.lock();
        state.snapshots.iter().find(|s| s.id == id).cloned()
    }

    /// Snapshot by timeline index
    pub fn get_index(&self, index: usize) -> Option<Snapshot> {
        self.timeline.lock().snapshots.get(index).cloned()
    }

    /// Snapshots in capture order, optionally filtered by kind and/or
    /// function, with offset/limit paging.
    pub fn list(
        &self,
        kind: Option<SnapshotKind>,
        function_name: Option<&str>,
        limit: Option<usize>,
        offset: usize,
    ) -> Vec<Snapshot> {
        let state = self.timeline.lock();
        state
            .snapshots
            .iter()
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .filter(|s| function_name.map_or(true, |f| s.function_name.as_deref() == Some(f)))
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Number of snapshots on the timeline
    pub fn len(&self) -> usize {
        self.timeline.lock().snapshots.len()
    }

    /// Whether the timeline is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor position
    pub fn cursor(&self) -> Option<usize> {
        self.timeline.lock().cursor
    }

    /// Deep copy of the state the cursor points at
    pub fn current_state(&self) -> Option<Value> {
        self.timeline.lock().current_state.clone()
    }

    /// Move the cursor to a snapshot id
    pub fn goto_id(&self, id: &str) -> Result<Value> {
        let mut state = self.timeline.lock();
        let index = state
            .snapshots
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| MysticError::not_found(id))?;
        Ok(set_cursor(&mut state, index))
    }

    /// Move the cursor to a timeline index
    pub fn goto_index(&self, index: usize) -> Result<Value> {
        let mut state = self.timeline.lock();
        if index >= state.snapshots.len() {
            return Err(MysticError::not_found(format!("snapshot index {index}")));
        }
        Ok(set_cursor(&mut state, index))
    }

    /// Move the cursor by a signed delta (clamped to the timeline)
    pub fn step(&self, delta: i64) -> Result<Value> {
        let mut state = self.timeline.lock();
        if state.snapshots.is_empty() {
            return Err(MysticError::not_found("empty timeline"));
        }
        let here = state.cursor.unwrap_or(0) as i64;
        let target = (here + delta).clamp(0, state.snapshots.len() as i64 - 1) as usize;
        Ok(set_cursor(&mut state, target))
    }

    /// Top-level diff of two snapshots' data.
    ///
    /// For two objects: `{added, removed, changed}` where `changed` maps a
    /// key to `[before, after]`. For anything else: `{before, after}`.
    pub fn diff(&self, a: &str, b: &str) -> Result<Value> {
        let before = self.get(a).ok_or_else(|| MysticError::not_found(a))?;
        let after = self.get(b).ok_or_else(|| MysticError::not_found(b))?;
        Ok(diff_values(&before.data, &after.data))
    }

    /// Name a snapshot for later navigation
    pub fn bookmark(&self, id: &str, name: impl Into<String>) -> Result<()> {
        let mut state = self.timeline.lock();
        if !state.snapshots.iter().any(|s| s.id == id) {
            return Err(MysticError::not_found(id));
        }
        state.bookmarks.insert(name.into(), id.to_string());
        Ok(())
    }

    /// Move the cursor to a bookmarked snapshot
    pub fn goto_bookmark(&self, name: &str) -> Result<Value> {
        let id = self
            .timeline
            .lock()
            .bookmarks
            .get(name)
            .cloned()
            .ok_or_else(|| MysticError::not_found(name))?;
        self.goto_id(&id)
    }

    /// Bookmark name → snapshot id
    pub fn bookmarks(&self) -> HashMap<String, String> {
        self.timeline.lock().bookmarks.clone()
    }

    /// Register a watcher invoked on every capture; panics are swallowed
    pub fn add_watcher<F>(&self, watcher: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.watchers.lock().push(Box::new(watcher));
    }

    /// Register a breakpoint fired when a capture matches `(function, line)`
    pub fn add_breakpoint<F>(&self, function: impl Into<String>, line: u32, callback: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.breakpoints.lock().push(Breakpoint {
            function: function.into(),
            line,
            callback: Box::new(callback),
        });
    }

    /// Serialize the whole timeline
    pub fn export(&self) -> Value {
        let state = self.timeline.lock();
        json!({
            "version": EXPORT_VERSION,
            "cursor": state.cursor,
            "bookmarks": state.bookmarks,
            "snapshots": state.snapshots,
        })
    }

    /// Replace the timeline from an exported form; the cursor resets to the
    /// last imported snapshot.
    pub fn import_timeline(&self, exported: Value) -> Result<usize> {
        let snapshots: Vec<Snapshot> =
            serde_json::from_value(exported.get("snapshots").cloned().unwrap_or(Value::Null))?;
        let bookmarks: HashMap<String, String> = exported
            .get("bookmarks")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let mut state = self.timeline.lock();
        state.next_seq = snapshots.iter().map(|s| s.seq + 1).max().unwrap_or(0);
        state.cursor = snapshots.len().checked_sub(1);
        state.current_state = snapshots.last().map(|s| s.data.clone());
        let count = snapshots.len();
        state.snapshots = snapshots;
        state.bookmarks = bookmarks;
        Ok(count)
    }

    /// `{count, cursor, bookmarks}` projection served over MCP
    pub fn timeline_info(&self) -> Value {
        let state = self.timeline.lock();
        json!({
            "count": state.snapshots.len(),
            "cursor": state.cursor,
            "bookmarks": state.bookmarks,
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

fn set_cursor(state: &mut TimelineState, index: usize) -> Value {
    state.cursor = Some(index);
    let data = state.snapshots[index].data.clone();
    state.current_state = Some(data.clone());
    data
}

fn diff_values(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let mut added = Map::new();
            let mut removed = Map::new();
            let mut changed = Map::new();
            for (key, value) in new {
                match old.get(key) {
                    None => {
                        added.insert(key.clone(), value.clone());
                    }
                    Some(previous) if previous != value => {
                        changed.insert(key.clone(), json!([previous, value]));
                    }
                    Some(_) => {}
                }
            }
            for (key, value) in old {
                if !new.contains_key(key) {
                    removed.insert(key.clone(), value.clone());
                }
            }
            json!({"added": added, "removed": removed, "changed": changed})
        }
        _ => json!({"before": before, "after": after}),
    }
}

fn clamp_depth(value: Value, depth: usize) -> Value {
    if depth == 0 {
        return Value::String(value.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter().map(|(k, v)| (k, clamp_depth(v, depth - 1))).collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| clamp_depth(v, depth - 1)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager() -> StateManager {
        StateManager::with_capacity(100)
    }

    #[test]
    fn test_ids_are_monotone() {
        let state = manager();
        let a = state.capture(SnapshotKind::Variable, json!(1), None, None, Map::new());
        let b = state.capture(SnapshotKind::Variable, json!(2), None, None, Map::new());
        assert_eq!(a, "snapshot_0");
        assert_eq!(b, "snapshot_1");
        assert_eq!(state.len(), 2);
        assert_eq!(state.cursor(), Some(1));
    }

    #[test]
    fn test_goto_restores_deep_copy() {
        let state = manager();
        state.capture(SnapshotKind::Variable, json!({"a": 1}), None, None, Map::new());
        state.capture(SnapshotKind::Variable, json!({"a": 2}), None, None, Map::new());

        let restored = state.goto_index(0).unwrap();
        assert_eq!(restored, json!({"a": 1}));
        assert_eq!(state.cursor(), Some(0));
        assert_eq!(state.current_state(), Some(json!({"a": 1})));
        // Navigation did not mutate the stored snapshot.
        assert_eq!(state.get_index(0).unwrap().data, json!({"a": 1}));
    }

    #[test]
    fn test_step_clamps() {
        let state = manager();
        for i in 0..3 {
            state.capture(SnapshotKind::Variable, json!(i), None, None, Map::new());
        }
        state.step(-10).unwrap();
        assert_eq!(state.cursor(), Some(0));
        state.step(1).unwrap();
        assert_eq!(state.cursor(), Some(1));
        state.step(100).unwrap();
        assert_eq!(state.cursor(), Some(2));
    }

    #[test]
    fn test_diff_mapping_data() {
        let state = manager();
        let a = state.capture(SnapshotKind::Variable, json!({"a": 1, "b": 2}), None, None, Map::new());
        let b = state.capture(
            SnapshotKind::Variable,
            json!({"a": 1, "b": 3, "c": 4}),
            None,
            None,
            Map::new(),
        );
        let diff = state.diff(&a, &b).unwrap();
        assert_eq!(diff["added"], json!({"c": 4}));
        assert_eq!(diff["removed"], json!({}));
        assert_eq!(diff["changed"], json!({"b": [2, 3]}));
    }

    #[test]
    fn test_diff_non_mapping_data() {
        let state = manager();
        let a = state.capture(SnapshotKind::Variable, json!(1), None, None, Map::new());
        let b = state.capture(SnapshotKind::Variable, json!([2]), None, None, Map::new());
        let diff = state.diff(&a, &b).unwrap();
        assert_eq!(diff, json!({"before": 1, "after": [2]}));
    }

    #[test]
    fn test_bookmarks() {
        let state = manager();
        let id = state.capture(SnapshotKind::Global, json!({"x": 1}), None, None, Map::new());
        state.capture(SnapshotKind::Global, json!({"x": 2}), None, None, Map::new());
        state.bookmark(&id, "before-change").unwrap();

        let restored = state.goto_bookmark("before-change").unwrap();
        assert_eq!(restored, json!({"x": 1}));
        assert!(state.goto_bookmark("missing").is_err());
        assert!(state.bookmark("snapshot_99", "nope").is_err());
    }

    #[test]
    fn test_head_trim_over_capacity() {
        let state = StateManager::with_capacity(3);
        for i in 0..5 {
            state.capture(SnapshotKind::Variable, json!(i), None, None, Map::new());
        }
        assert_eq!(state.len(), 3);
        // Oldest trimmed; ids keep counting.
        assert_eq!(state.get_index(0).unwrap().id, "snapshot_2");
        assert_eq!(state.get_index(2).unwrap().id, "snapshot_4");
    }

    #[test]
    fn test_export_import_round_trip() {
        let state = manager();
        let id = state.capture(SnapshotKind::FnArgs, json!({"n": 1}), Some("fib"), Some(3), Map::new());
        state.capture(SnapshotKind::FnReturn, json!({"n": 2}), Some("fib"), Some(9), Map::new());
        state.bookmark(&id, "entry").unwrap();

        let exported = state.export();
        let restored = StateManager::with_capacity(100);
        let count = restored.import_timeline(exported).unwrap();
        assert_eq!(count, 2);
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.cursor(), Some(1));
        assert_eq!(restored.bookmarks()["entry"], id);
        assert_eq!(restored.get(&id).unwrap().data, json!({"n": 1}));

        // Sequence numbering continues after the imported tail.
        let next = restored.capture(SnapshotKind::Variable, json!(3), None, None, Map::new());
        assert_eq!(next, "snapshot_2");
    }

    #[test]
    fn test_watchers_fire_and_swallow_panics() {
        let state = manager();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        state.add_watcher(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        state.add_watcher(|_| panic!("bad watcher"));

        state.capture(SnapshotKind::Variable, json!(1), None, None, Map::new());
        state.capture(SnapshotKind::Variable, json!(2), None, None, Map::new());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_breakpoint_matches_function_and_line() {
        let state = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        state.add_breakpoint("fib", 3, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        state.capture(SnapshotKind::Local, json!(1), Some("fib"), Some(3), Map::new());
        state.capture(SnapshotKind::Local, json!(2), Some("fib"), Some(4), Map::new());
        state.capture(SnapshotKind::Local, json!(3), Some("other"), Some(3), Map::new());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_list_filters_and_paging() {
        let state = manager();
        for i in 0..4 {
            state.capture(SnapshotKind::Variable, json!(i), Some("f"), None, Map::new());
        }
        state.capture(SnapshotKind::Exception, json!("boom"), Some("g"), None, Map::new());

        assert_eq!(state.list(Some(SnapshotKind::Exception), None, None, 0).len(), 1);
        assert_eq!(state.list(None, Some("f"), None, 0).len(), 4);
        let page = state.list(None, None, Some(2), 1);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "snapshot_1");
    }

    #[test]
    fn test_capture_serialize_fallback_shape() {
        let state = manager();
        #[derive(Debug, Serialize)]
        struct Point {
            x: u32,
            y: u32,
        }
        let id = state.capture_serialize(SnapshotKind::Variable, &Point { x: 1, y: 2 }, None, None);
        assert_eq!(state.get(&id).unwrap().data, json!({"x": 1, "y": 2}));
    }

    #[test]
    fn test_clamp_depth_truncates() {
        let deep = json!({"a": {"b": {"c": 1}}});
        let clamped = clamp_depth(deep, 2);
        assert_eq!(clamped["a"]["b"], json!("{\"c\":1}"));
    }
}
