//! # mystic - a runtime function-control plane
//!
//! Mystic interposes on registered callables to provide a pluggable
//! call-interception pipeline, structured call logging with correlation and
//! redaction, introspection with JSON-schema generation, low-overhead
//! performance accounting, and a snapshot/timeline state store. An
//! MCP-style JSON-RPC surface exposes all of it to an external AI client.
//!
//! ## Quick Start
//!
//! ```rust
//! use mystic::{cache, hijack, register, CallArgs, FunctionSpec};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let spec = FunctionSpec::new("pricing", "quote_demo", |args| {
//!     let base = args.positional[0].as_i64().unwrap_or(0);
//!     Ok(json!(base * 2))
//! });
//! register(spec).unwrap();
//!
//! let wrapper = hijack("pricing.quote_demo", vec![cache(Duration::from_secs(3600))]).unwrap();
//! assert_eq!(wrapper.call(CallArgs::positional(vec![json!(21)])).unwrap(), json!(42));
//! // Second call with the same arguments is served from the cache.
//! assert_eq!(wrapper.call(CallArgs::positional(vec![json!(21)])).unwrap(), json!(42));
//! ```
//!
//! ## Core Concepts
//!
//! ### 1. Registration and identity
//!
//! Callables are registered as [`FunctionSpec`]s and keyed everywhere by
//! [`FunctionIdentity`] (`module.qualified_name`). Arguments and results
//! travel as `serde_json::Value`, which is also the MCP wire form.
//!
//! ### 2. The strategy chain
//!
//! Hijacking installs a [`CallHijacker`] running an ordered chain of
//! [`Strategy`] variants (cache, mock, block, redirect, analysis,
//! conditional). Exactly one strategy - or the original - owns each call's
//! outcome; passive strategies observe and let the chain continue.
//!
//! ### 3. Observability
//!
//! Every call emits correlated, redacted [`logger::CallEvent`]s; the
//! [`tracker::PerformanceTracker`] keeps Welford rolling statistics; the
//! [`StateManager`] captures snapshot timelines with navigation and diff.
//!
//! ## Module Organization
//!
//! - [`config`] - environment tag, directories, process-wide settings
//! - [`identity`] - stable function identity
//! - [`function`] - registered callables and declared signatures
//! - [`redact`] - sensitive-data masking
//! - [`correlation`] - thread-scoped correlation ids
//! - [`tracker`] - per-function rolling statistics
//! - [`logger`] - structured call events, formats, subscribers
//! - [`inspect`] - signature/doc/source analysis and JSON schemas
//! - [`hijack`] - the interception engine and registry
//! - [`state`] - snapshot timeline
//! - [`mcp`] - JSON-RPC surface over stdio

pub mod config;
pub mod correlation;
pub mod error;
pub mod function;
pub mod hijack;
pub mod identity;
pub mod inspect;
pub mod logger;
pub mod mcp;
pub mod redact;
pub mod state;
pub mod tracker;

pub use config::{Environment, LogFormat, MysticConfig};
pub use error::{ErrorRecord, MysticError, Result};
pub use function::{CallArgs, FunctionSpec, NativeHandler, ParamSpec, SignatureFlags, TypeHint};
pub use hijack::{
    AnalysisStrategy, BlockStrategy, CacheStrategy, CallHijacker, ConditionalStrategy,
    HijackContext, HijackResult, MockStrategy, Priority, RedirectStrategy, Strategy,
};
pub use identity::FunctionIdentity;
pub use inspect::{FunctionAnalysis, Inspector};
pub use logger::CallLogger;
pub use mcp::MysticMcpServer;
pub use redact::Redactor;
pub use state::{Snapshot, SnapshotKind, StateManager};
pub use tracker::PerformanceTracker;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Register a callable in the process-wide registry.
///
/// Fails with [`MysticError::RegistryConflict`] when the identity is taken;
/// use [`hijack::registry::HijackRegistry::register`] with `replace = true`
/// to overwrite deliberately.
pub fn register(spec: FunctionSpec) -> Result<FunctionIdentity> {
    hijack::registry::global().register(spec, false)
}

/// Install (or extend) an interception chain on a registered callable
pub fn hijack(full_name: &str, strategies: Vec<Strategy>) -> Result<Arc<CallHijacker>> {
    hijack::registry::global().hijack(full_name, strategies)
}

/// Restore original dispatch for one callable
pub fn unhijack(full_name: &str) -> Result<()> {
    hijack::registry::global().unhijack(full_name)
}

/// Invoke a registered callable, through its wrapper when hijacked
pub fn call(full_name: &str, args: CallArgs) -> Result<Value> {
    hijack::registry::global().call(full_name, args)
}

/// Caching strategy with the given ttl
pub fn cache(ttl: Duration) -> Strategy {
    Strategy::Cache(CacheStrategy::new(ttl))
}

/// Mock strategy returning `data` in development/testing environments
pub fn mock(data: Value) -> Strategy {
    Strategy::Mock(MockStrategy::new(data))
}

/// Block strategy returning a null sentinel
pub fn block(reason: &str) -> Strategy {
    Strategy::Block(BlockStrategy::new(reason))
}

/// Redirect strategy sending calls to `target`
pub fn redirect<F>(target: F) -> Strategy
where
    F: Fn(&CallArgs) -> std::result::Result<Value, ErrorRecord> + Send + Sync + 'static,
{
    Strategy::Redirect(RedirectStrategy::new(target))
}

/// Passive analysis strategy
pub fn analyze() -> Strategy {
    Strategy::Analysis(AnalysisStrategy::new())
}
