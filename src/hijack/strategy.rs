//! The strategy variant set
//!
//! Strategies form a closed sum rather than an open trait hierarchy: the
//! extension points are the `Analysis` callback and the `Conditional`
//! predicate with sub-strategies. Each strategy has a priority; a wrapper
//! orders its chain by priority descending, then insertion order.

use super::context::{HijackContext, HijackResult};
use crate::config::{self, Environment};
use crate::error::{ErrorRecord, Result};
use crate::function::{CallArgs, NativeHandler};
use crate::tracker;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

pub use super::cache::CacheStrategy;

/// Chain ordering; higher runs first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// One link in an interception chain
pub enum Strategy {
    Cache(CacheStrategy),
    Mock(MockStrategy),
    Block(BlockStrategy),
    Redirect(RedirectStrategy),
    Analysis(AnalysisStrategy),
    Conditional(ConditionalStrategy),
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Strategy::{}({:?})", self.name(), self.priority())
    }
}

impl Strategy {
    /// Short name, used in events and the MCP surface
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cache(_) => "cache",
            Self::Mock(_) => "mock",
            Self::Block(_) => "block",
            Self::Redirect(_) => "redirect",
            Self::Analysis(_) => "analyze",
            Self::Conditional(_) => "conditional",
        }
    }

    /// Chain ordering position
    pub fn priority(&self) -> Priority {
        match self {
            Self::Cache(s) => s.priority(),
            Self::Mock(s) => s.priority,
            Self::Block(s) => s.priority,
            Self::Redirect(s) => s.priority,
            Self::Analysis(s) => s.priority,
            Self::Conditional(s) => s.priority,
        }
    }

    /// Whether this strategy wants to see the call at all
    pub fn should_intercept(&self, ctx: &HijackContext) -> bool {
        match self {
            Self::Cache(_) | Self::Block(_) | Self::Redirect(_) | Self::Analysis(_) => true,
            Self::Mock(s) => s.environments.contains(&config::environment()),
            Self::Conditional(s) => match (s.predicate)(ctx) {
                true => s.when_true.should_intercept(ctx),
                false => s.when_false.as_ref().map(|f| f.should_intercept(ctx)).unwrap_or(false),
            },
        }
    }

    /// Run the strategy. `Err` is an internal fault: the wrapper logs it,
    /// skips the strategy, and continues the chain. A terminal outcome for
    /// the caller (including an original failure) is an `Ok` result with
    /// `executed = true`.
    pub fn handle(&self, ctx: &HijackContext, original: &NativeHandler) -> Result<HijackResult> {
        match self {
            Self::Cache(s) => s.handle(ctx, original),
            Self::Mock(s) => s.handle(ctx),
            Self::Block(s) => Ok(s.handle()),
            Self::Redirect(s) => Ok(s.handle(ctx)),
            Self::Analysis(s) => Ok(s.handle(ctx)),
            Self::Conditional(s) => match (s.predicate)(ctx) {
                true => s.when_true.handle(ctx, original),
                false => match &s.when_false {
                    Some(strategy) => strategy.handle(ctx, original),
                    None => Ok(HijackResult::pass_through()),
                },
            },
        }
    }
}

/// Canned or computed responses, gated by environment
pub struct MockStrategy {
    source: MockSource,
    environments: HashSet<Environment>,
    pub(crate) priority: Priority,
}

/// Where a mock result comes from
pub enum MockSource {
    /// Returned verbatim
    Value(Value),
    /// Computed from the call context
    Factory(Arc<dyn Fn(&HijackContext) -> Value + Send + Sync>),
}

impl MockStrategy {
    /// Mock with a fixed value, allowed in development and testing
    pub fn new(data: Value) -> Self {
        Self {
            source: MockSource::Value(data),
            environments: HashSet::from([Environment::Development, Environment::Testing]),
            priority: Priority::High,
        }
    }

    /// Mock computed per call
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&HijackContext) -> Value + Send + Sync + 'static,
    {
        Self {
            source: MockSource::Factory(Arc::new(factory)),
            environments: HashSet::from([Environment::Development, Environment::Testing]),
            priority: Priority::High,
        }
    }

    /// Restrict to an explicit environment set
    pub fn environments<I: IntoIterator<Item = Environment>>(mut self, envs: I) -> Self {
        self.environments = envs.into_iter().collect();
        self
    }

    /// Override the chain priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn handle(&self, ctx: &HijackContext) -> Result<HijackResult> {
        let value = match &self.source {
            MockSource::Value(v) => v.clone(),
            MockSource::Factory(f) => f(ctx),
        };
        Ok(HijackResult::produced(value).with_meta("mocked", Value::Bool(true)))
    }
}

/// Refuse the call, either loudly or with a sentinel
pub struct BlockStrategy {
    reason: String,
    raise_error: bool,
    sentinel: Value,
    pub(crate) priority: Priority,
}

impl BlockStrategy {
    /// Block with a sentinel result (null)
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            raise_error: false,
            sentinel: Value::Null,
            priority: Priority::Critical,
        }
    }

    /// Propagate a `BlockedError` instead of returning the sentinel
    pub fn raising(mut self) -> Self {
        self.raise_error = true;
        self
    }

    /// Replace the sentinel value
    pub fn with_sentinel(mut self, sentinel: Value) -> Self {
        self.sentinel = sentinel;
        self
    }

    fn handle(&self) -> HijackResult {
        let result = if self.raise_error {
            HijackResult::failed(ErrorRecord::new("BlockedError", self.reason.clone()))
        } else {
            HijackResult::produced(self.sentinel.clone())
        };
        result.with_meta("blocked", Value::String(self.reason.clone()))
    }
}

/// Send the call to a different handler
pub struct RedirectStrategy {
    target: NativeHandler,
    arg_transform: Option<Arc<dyn Fn(CallArgs) -> CallArgs + Send + Sync>>,
    result_transform: Option<Arc<dyn Fn(Value) -> Value + Send + Sync>>,
    pub(crate) priority: Priority,
}

impl RedirectStrategy {
    /// Redirect every call to `target`
    pub fn new<F>(target: F) -> Self
    where
        F: Fn(&CallArgs) -> std::result::Result<Value, ErrorRecord> + Send + Sync + 'static,
    {
        Self {
            target: Arc::new(target),
            arg_transform: None,
            result_transform: None,
            priority: Priority::High,
        }
    }

    /// Rewrite arguments before they reach the target
    pub fn with_arg_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(CallArgs) -> CallArgs + Send + Sync + 'static,
    {
        self.arg_transform = Some(Arc::new(transform));
        self
    }

    /// Rewrite the target's result
    pub fn with_result_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.result_transform = Some(Arc::new(transform));
        self
    }

    /// Override the chain priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn handle(&self, ctx: &HijackContext) -> HijackResult {
        let mut args = ctx.call_args();
        if let Some(transform) = &self.arg_transform {
            args = transform(args);
        }
        match (self.target)(&args) {
            Ok(mut value) => {
                if let Some(transform) = &self.result_transform {
                    value = transform(value);
                }
                HijackResult::produced(value).with_meta("redirected", Value::Bool(true))
            }
            Err(record) => {
                HijackResult::failed(record).with_meta("redirected", Value::Bool(true))
            }
        }
    }
}

/// One recorded observation from the Analysis strategy
#[derive(Debug, Clone)]
pub struct Observation {
    /// Identity of the observed call
    pub identity: crate::identity::FunctionIdentity,
    /// Correlation id of the observed call
    pub correlation_id: String,
    /// Observation timestamp
    pub ts: DateTime<Utc>,
    /// Arguments, when argument tracking is on
    pub args: Option<Vec<Value>>,
    /// Process RSS at observation time, when memory tracking is on
    pub rss_bytes: Option<i64>,
}

/// Passive observer: records, optionally calls back, and always lets the
/// chain continue (`executed = false`). The only strategy for which
/// pass-through is the normal outcome.
pub struct AnalysisStrategy {
    callback: Option<Arc<dyn Fn(&Observation) + Send + Sync>>,
    track_performance: bool,
    track_arguments: bool,
    track_memory: bool,
    observations: Mutex<Vec<Observation>>,
    pub(crate) priority: Priority,
}

impl Default for AnalysisStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStrategy {
    /// Observe performance and arguments, no callback
    pub fn new() -> Self {
        Self {
            callback: None,
            track_performance: true,
            track_arguments: true,
            track_memory: false,
            observations: Mutex::new(Vec::new()),
            priority: Priority::Normal,
        }
    }

    /// Invoke `callback` for every observation
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Observation) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Toggle observation retention; with it off, only the callback sees
    /// observations
    pub fn track_performance(mut self, on: bool) -> Self {
        self.track_performance = on;
        self
    }

    /// Toggle argument capture
    pub fn track_arguments(mut self, on: bool) -> Self {
        self.track_arguments = on;
        self
    }

    /// Toggle the RSS probe
    pub fn track_memory(mut self, on: bool) -> Self {
        self.track_memory = on;
        self
    }

    /// Override the chain priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Number of recorded observations
    pub fn observation_count(&self) -> usize {
        self.observations.lock().len()
    }

    /// Copy of the recorded observations
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    fn handle(&self, ctx: &HijackContext) -> HijackResult {
        let observation = Observation {
            identity: ctx.identity.clone(),
            correlation_id: ctx.correlation_id.clone(),
            ts: Utc::now(),
            args: self.track_arguments.then(|| ctx.args.clone()),
            rss_bytes: if self.track_memory { tracker::probe_rss_bytes() } else { None },
        };
        if let Some(callback) = &self.callback {
            callback(&observation);
        }
        if self.track_performance {
            self.observations.lock().push(observation);
        }
        HijackResult::pass_through().with_meta("analyzed", Value::Bool(true))
    }
}

/// Delegate to one of two strategies based on a predicate
pub struct ConditionalStrategy {
    pub(crate) predicate: Arc<dyn Fn(&HijackContext) -> bool + Send + Sync>,
    pub(crate) when_true: Box<Strategy>,
    pub(crate) when_false: Option<Box<Strategy>>,
    pub(crate) priority: Priority,
}

impl ConditionalStrategy {
    /// Delegate to `when_true` when the predicate holds; otherwise pass
    /// through.
    pub fn new<P>(predicate: P, when_true: Strategy) -> Self
    where
        P: Fn(&HijackContext) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            when_true: Box::new(when_true),
            when_false: None,
            priority: Priority::Normal,
        }
    }

    /// Delegate to `when_false` when the predicate does not hold
    pub fn otherwise(mut self, when_false: Strategy) -> Self {
        self.when_false = Some(Box::new(when_false));
        self
    }

    /// Override the chain priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}
