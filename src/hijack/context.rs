//! Per-call context and strategy outcomes

use crate::error::ErrorRecord;
use crate::function::CallArgs;
use crate::identity::FunctionIdentity;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Immutable record of one intercepted call.
///
/// Created on entry, passed by reference through the strategy chain, and
/// dropped on exit. Thread-local state holds only the current correlation
/// id; everything a strategy needs is in here.
#[derive(Debug, Clone)]
pub struct HijackContext {
    /// Identity of the wrapped callable
    pub identity: FunctionIdentity,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Map<String, Value>,
    /// Correlation id for this invocation
    pub correlation_id: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Caller-supplied metadata
    pub metadata: Map<String, Value>,
}

impl HijackContext {
    /// Build a context for one invocation
    pub fn new(
        identity: FunctionIdentity,
        call_args: &CallArgs,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            args: call_args.positional.clone(),
            kwargs: call_args.keyword.clone(),
            correlation_id: correlation_id.into(),
            started_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Attach caller metadata
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The argument payload, for invoking handlers
    pub fn call_args(&self) -> CallArgs {
        CallArgs { positional: self.args.clone(), keyword: self.kwargs.clone() }
    }
}

/// Outcome of one strategy's `handle`.
///
/// `executed = true` means the strategy owns the call outcome (a value from
/// cache, mock, redirect, or the original — or an error to propagate);
/// `executed = false` means pass-through and the chain continues.
#[derive(Debug, Clone)]
pub struct HijackResult {
    /// Whether this result terminates the chain
    pub executed: bool,
    /// Produced value
    pub result: Option<Value>,
    /// Error to propagate to the caller
    pub error: Option<ErrorRecord>,
    /// Strategy-supplied metadata (e.g. `cache_hit`)
    pub metadata: Map<String, Value>,
}

impl HijackResult {
    /// A produced value; stops the chain
    pub fn produced(value: Value) -> Self {
        Self { executed: true, result: Some(value), error: None, metadata: Map::new() }
    }

    /// Pass-through; the chain continues
    pub fn pass_through() -> Self {
        Self { executed: false, result: None, error: None, metadata: Map::new() }
    }

    /// A terminal error; stops the chain and propagates
    pub fn failed(error: ErrorRecord) -> Self {
        Self { executed: true, result: None, error: Some(error), metadata: Map::new() }
    }

    /// Attach metadata
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_snapshots_args() {
        let args = CallArgs::positional(vec![json!(1)]).with_kwarg("k", json!("v"));
        let ctx = HijackContext::new(FunctionIdentity::new("m", "f"), &args, "c-1");
        assert_eq!(ctx.args, vec![json!(1)]);
        assert_eq!(ctx.kwargs["k"], json!("v"));
        assert_eq!(ctx.call_args(), args);
    }

    #[test]
    fn test_result_constructors() {
        assert!(HijackResult::produced(json!(1)).executed);
        assert!(!HijackResult::pass_through().executed);
        let failed = HijackResult::failed(ErrorRecord::new("E", "m"));
        assert!(failed.executed);
        assert!(failed.result.is_none());
    }
}
