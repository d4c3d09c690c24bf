//! Thread-scoped correlation context
//!
//! Every call/return/error event pair carries one correlation id. The store
//! is thread-scoped: an id set by an outer frame is inherited by inner calls
//! on the same thread, and a [`CorrelationFrame`] guard restores the parent
//! id when the frame ends. A cross-thread activity map records when each id
//! was last seen.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use uuid::Uuid;

thread_local! {
    static STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// id -> last-seen timestamp, across threads
static ACTIVITY: Lazy<Mutex<HashMap<String, DateTime<Utc>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Generate a fresh correlation id (UUID v4, unique per process lifetime)
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

/// The current thread's correlation id, if any
pub fn current() -> Option<String> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Replace the current thread's correlation id.
///
/// MCP request handlers use this to adopt the incoming request id for the
/// duration of the handler.
pub fn set_current(id: impl Into<String>) {
    let id = id.into();
    touch(&id);
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.pop();
        stack.push(id);
    });
}

/// Drop all correlation state on this thread
pub fn clear() {
    STACK.with(|stack| stack.borrow_mut().clear());
}

/// Push `id` as the current correlation id, returning a guard that restores
/// the parent id on drop.
pub fn enter(id: impl Into<String>) -> CorrelationFrame {
    let id = id.into();
    touch(&id);
    STACK.with(|stack| stack.borrow_mut().push(id));
    CorrelationFrame { _private: () }
}

/// The current id, or a freshly generated one pushed as a new frame.
///
/// Returns the id together with an optional guard: the guard is `Some` only
/// when this call created the frame, so inherited ids are left in place.
pub fn current_or_enter() -> (String, Option<CorrelationFrame>) {
    match current() {
        Some(id) => {
            touch(&id);
            (id, None)
        }
        None => {
            let id = generate();
            let frame = enter(id.clone());
            (id, Some(frame))
        }
    }
}

/// Snapshot of the cross-thread activity map
pub fn active() -> Vec<(String, DateTime<Utc>)> {
    let map = ACTIVITY.lock();
    let mut entries: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries
}

/// Forget ids not seen since `cutoff`
pub fn prune_activity(cutoff: DateTime<Utc>) {
    ACTIVITY.lock().retain(|_, seen| *seen >= cutoff);
}

fn touch(id: &str) {
    ACTIVITY.lock().insert(id.to_string(), Utc::now());
}

/// Guard for one correlation frame; restores the parent id on drop
#[must_use = "dropping the frame immediately restores the parent id"]
pub struct CorrelationFrame {
    _private: (),
}

impl Drop for CorrelationFrame {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
