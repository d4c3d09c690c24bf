//! Structured call logging
//!
//! The call logger turns invocations into [`CallEvent`]s, applies the
//! redactor, renders events in the configured format, and fans them out to
//! subscribers. The ring buffer and the subscriber list are updated under a
//! single emission lock, so a subscriber never observes event k+1 before it
//! has been handed event k, and late subscribers can fetch recent history.

pub mod decorators;
pub mod event;
pub mod format;
pub mod sink;

pub use event::{CallEvent, EventKind};

use crate::config::{self, LogFormat};
use crate::correlation;
use crate::error::ErrorRecord;
use crate::identity::FunctionIdentity;
use crate::redact::Redactor;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sink::RotatingFile;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Subscriber callback; invoked synchronously for every event
pub type SubscriberFn = Box<dyn Fn(&CallEvent) + Send + Sync>;

/// Handle returned by [`CallLogger::add_subscriber`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct SubscriberEntry {
    id: SubscriberId,
    callback: SubscriberFn,
    faults: u64,
}

/// Ring buffer + subscribers + sink, guarded by one lock so ordering is
/// uniform across all observers.
struct EmitState {
    ring: VecDeque<CallEvent>,
    capacity: usize,
    subscribers: Vec<SubscriberEntry>,
    next_id: u64,
    sink: Option<RotatingFile>,
}

/// Structured event logger with redaction and subscriber fan-out
pub struct CallLogger {
    log_format: LogFormat,
    filter_sensitive: bool,
    redactor: Redactor,
    emit_state: Mutex<EmitState>,
}

impl CallLogger {
    /// Default ring capacity
    pub const DEFAULT_RING_CAPACITY: usize = 1000;

    /// Create a logger with an explicit format and redaction toggle
    pub fn new(log_format: LogFormat, filter_sensitive: bool) -> Self {
        let sink = match log_format {
            LogFormat::File => {
                let path = config::config().log_dir.join("mystic.log");
                Some(RotatingFile::new(path, RotatingFile::DEFAULT_MAX_BYTES))
            }
            _ => None,
        };
        Self {
            log_format,
            filter_sensitive,
            redactor: Redactor::new(),
            emit_state: Mutex::new(EmitState {
                ring: VecDeque::with_capacity(Self::DEFAULT_RING_CAPACITY),
                capacity: Self::DEFAULT_RING_CAPACITY,
                subscribers: Vec::new(),
                next_id: 0,
                sink,
            }),
        }
    }

    /// Create a logger from the process-wide configuration
    pub fn from_config() -> Self {
        let cfg = config::config();
        Self::new(cfg.log_format, cfg.filter_sensitive)
    }

    /// Replace the redactor (e.g. to add user patterns)
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Record a call entry. Returns the correlation id, creating one and
    /// setting it current when the caller passes none and none is active.
    pub fn log_call(
        &self,
        identity: &FunctionIdentity,
        args: &[Value],
        kwargs: &Map<String, Value>,
        correlation_id: Option<String>,
    ) -> String {
        let id = match correlation_id {
            Some(id) => {
                correlation::set_current(id.clone());
                id
            }
            None => match correlation::current() {
                Some(id) => id,
                None => {
                    let id = correlation::generate();
                    correlation::set_current(id.clone());
                    id
                }
            },
        };
        let event = CallEvent::new(EventKind::Call, id.clone())
            .with_identity(identity.clone())
            .with_args(self.filter_args(args), self.filter_kwargs(kwargs));
        self.emit(event);
        id
    }

    /// Record a call exit. `error` is mutually exclusive with `result`.
    /// When no correlation id is passed, the thread's current id is used,
    /// even if it was produced by an earlier call on this thread.
    pub fn log_return(
        &self,
        identity: &FunctionIdentity,
        result: Option<Value>,
        duration: Duration,
        correlation_id: Option<String>,
        error: Option<ErrorRecord>,
    ) {
        let id = correlation_id
            .or_else(correlation::current)
            .unwrap_or_else(correlation::generate);
        let kind = if error.is_some() { EventKind::Error } else { EventKind::Return };
        let event = CallEvent::new(kind, id)
            .with_identity(identity.clone())
            .with_outcome(result.map(|v| self.filter_value(&v)), error)
            .with_duration(duration.as_secs_f64());
        self.emit(event);
    }

    /// Record an incoming JSON-RPC request; the request id is the
    /// correlation id.
    pub fn log_mcp_request(&self, method: &str, params: &Value, id: &Value) {
        let event = CallEvent::new(EventKind::McpRequest, json_id(id))
            .with_args(vec![self.filter_value(params)], Map::new())
            .with_meta("method", Value::String(method.to_string()));
        self.emit(event);
    }

    /// Record an outgoing JSON-RPC response
    pub fn log_mcp_response(&self, result: Option<&Value>, id: &Value, error: Option<ErrorRecord>) {
        let event = CallEvent::new(EventKind::McpResponse, json_id(id))
            .with_outcome(result.map(|v| self.filter_value(v)), error);
        self.emit(event);
    }

    /// Register a subscriber; it receives every subsequent event in emission
    /// order. Panics inside the callback are caught and counted.
    pub fn add_subscriber<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&CallEvent) + Send + Sync + 'static,
    {
        let mut state = self.emit_state.lock();
        state.next_id += 1;
        let id = SubscriberId(state.next_id);
        state.subscribers.push(SubscriberEntry { id, callback: Box::new(callback), faults: 0 });
        id
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn remove_subscriber(&self, id: SubscriberId) {
        self.emit_state.lock().subscribers.retain(|s| s.id != id);
    }

    /// Total subscriber faults counted so far
    pub fn subscriber_faults(&self) -> u64 {
        self.emit_state.lock().subscribers.iter().map(|s| s.faults).sum()
    }

    /// The most recent events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<CallEvent> {
        let state = self.emit_state.lock();
        let skip = state.ring.len().saturating_sub(limit);
        state.ring.iter().skip(skip).cloned().collect()
    }

    /// Query the ring buffer by identity and/or timestamp
    pub fn query(
        &self,
        identity: Option<&FunctionIdentity>,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<CallEvent> {
        let state = self.emit_state.lock();
        let matches: Vec<CallEvent> = state
            .ring
            .iter()
            .filter(|e| identity.map_or(true, |id| e.identity.as_ref() == Some(id)))
            .filter(|e| since.map_or(true, |cutoff| e.ts >= cutoff))
            .cloned()
            .collect();
        let skip = matches.len().saturating_sub(limit);
        matches.into_iter().skip(skip).collect()
    }

    /// Push an already-built event through the pipeline
    pub fn emit(&self, event: CallEvent) {
        let line = format::render(&event, self.log_format);
        let mut state = self.emit_state.lock();

        match self.log_format {
            LogFormat::File => {
                if let Some(sink) = state.sink.as_mut() {
                    sink.write_line(&line);
                }
            }
            _ => eprintln!("{line}"),
        }

        if state.ring.len() >= state.capacity {
            state.ring.pop_front();
        }
        state.ring.push_back(event.clone());

        for subscriber in state.subscribers.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(&event)));
            if outcome.is_err() {
                subscriber.faults += 1;
                tracing::debug!(subscriber = subscriber.id.0, "subscriber panicked; swallowed");
            }
        }
    }

    fn filter_value(&self, value: &Value) -> Value {
        if self.filter_sensitive {
            self.redactor.redact_value(value)
        } else {
            value.clone()
        }
    }

    fn filter_args(&self, args: &[Value]) -> Vec<Value> {
        args.iter().map(|v| self.filter_value(v)).collect()
    }

    fn filter_kwargs(&self, kwargs: &Map<String, Value>) -> Map<String, Value> {
        kwargs.iter().map(|(k, v)| (k.clone(), self.filter_value(v))).collect()
    }
}

fn json_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

static GLOBAL: Lazy<Arc<CallLogger>> = Lazy::new(|| Arc::new(CallLogger::from_config()));

/// The module-level logger singleton, built from the process configuration
pub fn global() -> Arc<CallLogger> {
    Arc::clone(&GLOBAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_logger() -> CallLogger {
        CallLogger::new(LogFormat::JsonRpc, true)
    }

    fn identity() -> FunctionIdentity {
        FunctionIdentity::new("auth", "login")
    }

    #[test]
    fn test_log_call_creates_correlation_id() {
        correlation::clear();
        let logger = test_logger();
        let id = logger.log_call(&identity(), &[json!("alice")], &Map::new(), None);
        assert!(!id.is_empty());
        assert_eq!(correlation::current(), Some(id));
        correlation::clear();
    }

    #[test]
    fn test_call_and_return_share_correlation_id() {
        correlation::clear();
        let logger = test_logger();
        let id = logger.log_call(&identity(), &[], &Map::new(), None);
        logger.log_return(&identity(), Some(json!(1)), Duration::from_millis(5), None, None);

        let events = logger.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].correlation_id, id);
        assert_eq!(events[1].correlation_id, id);
        correlation::clear();
    }

    #[test]
    fn test_redaction_applied_before_emission() {
        let logger = test_logger();
        let mut kwargs = Map::new();
        kwargs.insert("credentials".to_string(), json!("password=hunter2"));
        logger.log_call(&identity(), &[json!("alice")], &kwargs, Some("c-1".into()));

        let event = logger.recent(1).pop().unwrap();
        assert_eq!(event.args.unwrap()[0], json!("alice"));
        assert_eq!(event.kwargs.unwrap()["credentials"], json!("password=****"));
    }

    #[test]
    fn test_error_event_kind() {
        let logger = test_logger();
        logger.log_return(
            &identity(),
            None,
            Duration::from_millis(1),
            Some("c-2".into()),
            Some(ErrorRecord::new("ValueError", "bad")),
        );
        let event = logger.recent(1).pop().unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert!(event.result.is_none());
    }

    #[test]
    fn test_subscriber_order_and_fault_isolation() {
        let logger = test_logger();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        logger.add_subscriber(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        logger.add_subscriber(|_| panic!("bad subscriber"));

        logger.log_call(&identity(), &[], &Map::new(), Some("c-3".into()));
        logger.log_call(&identity(), &[], &Map::new(), Some("c-4".into()));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(logger.subscriber_faults(), 2);
    }

    #[test]
    fn test_remove_subscriber() {
        let logger = test_logger();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let id = logger.add_subscriber(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        logger.remove_subscriber(id);
        logger.log_call(&identity(), &[], &Map::new(), Some("c-5".into()));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ring_buffer_trims_oldest() {
        let logger = test_logger();
        {
            let mut state = logger.emit_state.lock();
            state.capacity = 3;
        }
        for i in 0..5 {
            logger.log_call(&identity(), &[json!(i)], &Map::new(), Some(format!("c-{i}")));
        }
        let events = logger.recent(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].correlation_id, "c-2");
        assert_eq!(events[2].correlation_id, "c-4");
    }

    #[test]
    fn test_query_filters() {
        let logger = test_logger();
        let other = FunctionIdentity::new("auth", "logout");
        logger.log_call(&identity(), &[], &Map::new(), Some("c-6".into()));
        logger.log_call(&other, &[], &Map::new(), Some("c-7".into()));

        let hits = logger.query(Some(&other), None, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].correlation_id, "c-7");
    }

    #[test]
    fn test_mcp_request_uses_request_id() {
        let logger = test_logger();
        logger.log_mcp_request("tools/call", &json!({"name": "x"}), &json!(42));
        let event = logger.recent(1).pop().unwrap();
        assert_eq!(event.correlation_id, "42");
        assert_eq!(event.metadata["method"], "tools/call");
    }
}
