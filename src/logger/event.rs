//! Call event records

use crate::error::ErrorRecord;
use crate::identity::FunctionIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Call,
    Return,
    Error,
    McpRequest,
    McpResponse,
}

impl EventKind {
    /// Lowercase name used in structured output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Return => "return",
            Self::Error => "error",
            Self::McpRequest => "mcp_request",
            Self::McpResponse => "mcp_response",
        }
    }
}

/// One structured event emitted by the call logger.
///
/// Every event carries a correlation id; the `call` and `return`/`error`
/// events of one invocation share the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Wall-clock timestamp
    pub ts: DateTime<Utc>,
    /// Correlation id for the invocation
    pub correlation_id: String,
    /// Function identity; absent for MCP transport events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<FunctionIdentity>,
    /// Positional arguments (redacted when filtering is on)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    /// Keyword arguments (redacted when filtering is on)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    /// Result value; mutually exclusive with `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error record; wins over `result` when both are supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// Call duration, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_s: Option<f64>,
    /// Sampled memory delta, bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_delta: Option<i64>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl CallEvent {
    /// Create a bare event of the given kind
    pub fn new(kind: EventKind, correlation_id: impl Into<String>) -> Self {
        Self {
            kind,
            ts: Utc::now(),
            correlation_id: correlation_id.into(),
            identity: None,
            args: None,
            kwargs: None,
            result: None,
            error: None,
            duration_s: None,
            memory_delta: None,
            metadata: Map::new(),
        }
    }

    /// Set the function identity
    pub fn with_identity(mut self, identity: FunctionIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set positional and keyword arguments
    pub fn with_args(mut self, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        self.args = Some(args);
        self.kwargs = Some(kwargs);
        self
    }

    /// Set the outcome. Error and result are mutually exclusive: when an
    /// error is present the result is dropped.
    pub fn with_outcome(mut self, result: Option<Value>, error: Option<ErrorRecord>) -> Self {
        if error.is_some() {
            self.error = error;
            self.result = None;
        } else {
            self.result = result;
        }
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration_s: f64) -> Self {
        self.duration_s = Some(duration_s);
        self
    }

    /// Set the memory delta
    pub fn with_memory_delta(mut self, delta: Option<i64>) -> Self {
        self.memory_delta = delta;
        self
    }

    /// Attach one metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Dotted function name, or the event kind for transport events
    pub fn subject(&self) -> String {
        match &self.identity {
            Some(identity) => identity.full_name(),
            None => self.kind.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_wins_over_result() {
        let event = CallEvent::new(EventKind::Error, "c-1")
            .with_outcome(Some(json!(1)), Some(ErrorRecord::new("ValueError", "boom")));
        assert!(event.result.is_none());
        assert_eq!(event.error.unwrap().kind, "ValueError");
    }

    #[test]
    fn test_serialized_kind_field() {
        let event = CallEvent::new(EventKind::Call, "c-2");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "call");
        assert_eq!(value["correlation_id"], "c-2");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_subject_prefers_identity() {
        let event = CallEvent::new(EventKind::Call, "c-3")
            .with_identity(FunctionIdentity::new("m", "f"));
        assert_eq!(event.subject(), "m.f");
        let bare = CallEvent::new(EventKind::McpRequest, "c-4");
        assert_eq!(bare.subject(), "mcp_request");
    }
}
