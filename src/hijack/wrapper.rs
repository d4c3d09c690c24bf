//! The call wrapper
//!
//! A `CallHijacker` fronts one registered callable with an ordered strategy
//! chain. Invariants: exactly one strategy (or the original) owns the
//! produced value; the original runs at most once per call; chain order is
//! deterministic (priority descending, then insertion order). Strategy
//! faults are logged and skipped; original faults and raised blocks
//! propagate to the caller after the error event and metrics update.

use super::context::{HijackContext, HijackResult};
use super::strategy::Strategy;
use crate::correlation;
use crate::error::{MysticError, Result};
use crate::function::{CallArgs, FunctionSpec, NativeHandler};
use crate::identity::FunctionIdentity;
use crate::logger::{CallEvent, CallLogger, EventKind};
use crate::tracker::{self, PerformanceTracker};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Best-effort notification sent to MCP subscribers around each call
#[derive(Debug, Clone)]
pub struct HijackNotification {
    /// call / return / error
    pub kind: EventKind,
    /// Identity of the wrapped callable
    pub identity: FunctionIdentity,
    /// Correlation id of the invocation
    pub correlation_id: String,
    /// Notification timestamp
    pub ts: DateTime<Utc>,
}

type NotificationFn = Box<dyn Fn(&HijackNotification) + Send + Sync>;

/// Wrapper interposing an ordered strategy chain on one callable.
///
/// The wrapper preserves the callable's declared surface (name, module,
/// doc, parameter names); callers holding a wrapper reference keep a live
/// callable even after unhijacking.
pub struct CallHijacker {
    spec: Arc<FunctionSpec>,
    original: NativeHandler,
    strategies: Mutex<Vec<Arc<Strategy>>>,
    call_count: AtomicU64,
    last_args: Mutex<Option<CallArgs>>,
    last_result: Mutex<Option<Value>>,
    notifiers: Mutex<Vec<NotificationFn>>,
    logger: Arc<CallLogger>,
    tracker: Arc<PerformanceTracker>,
}

impl CallHijacker {
    /// Wrap a registered callable with an initial strategy list
    pub fn new(
        spec: Arc<FunctionSpec>,
        strategies: Vec<Strategy>,
        logger: Arc<CallLogger>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        let original = spec.handler();
        let hijacker = Self {
            spec,
            original,
            strategies: Mutex::new(Vec::new()),
            call_count: AtomicU64::new(0),
            last_args: Mutex::new(None),
            last_result: Mutex::new(None),
            notifiers: Mutex::new(Vec::new()),
            logger,
            tracker,
        };
        for strategy in strategies {
            hijacker.add_strategy(strategy);
        }
        hijacker
    }

    /// Identity of the wrapped callable
    pub fn identity(&self) -> &FunctionIdentity {
        &self.spec.identity
    }

    /// Declared surface of the wrapped callable; the wrapper's visible
    /// name, module, doc and parameter names are the original's
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// The unwrapped handler
    pub fn original(&self) -> NativeHandler {
        Arc::clone(&self.original)
    }

    /// Append a strategy, keeping the chain sorted by priority descending
    /// with insertion order preserved within a priority.
    pub fn add_strategy(&self, strategy: Strategy) {
        let mut strategies = self.strategies.lock();
        strategies.push(Arc::new(strategy));
        strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Remove every strategy with the given name; returns how many were
    /// dropped.
    pub fn remove_strategy(&self, name: &str) -> usize {
        let mut strategies = self.strategies.lock();
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        before - strategies.len()
    }

    /// Names of the active strategies, in chain order
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.lock().iter().map(|s| s.name()).collect()
    }

    /// Snapshot of the chain, for strategies that expose state (e.g. the
    /// Analysis observation list)
    pub fn strategies(&self) -> Vec<Arc<Strategy>> {
        self.strategies.lock().clone()
    }

    /// Calls made through this wrapper
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Most recent argument payload
    pub fn last_args(&self) -> Option<CallArgs> {
        self.last_args.lock().clone()
    }

    /// Most recent produced value
    pub fn last_result(&self) -> Option<Value> {
        self.last_result.lock().clone()
    }

    /// Register an MCP notification subscriber
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&HijackNotification) + Send + Sync + 'static,
    {
        self.notifiers.lock().push(Box::new(callback));
    }

    /// Invoke through the strategy chain.
    ///
    /// 1. Build the context (inheriting or creating a correlation id).
    /// 2. Emit a best-effort `call` notification and the call event.
    /// 3. Walk the chain until a strategy produces `executed = true`.
    /// 4. Fall through to the original when nothing produced a value.
    /// 5. Emit the `return`/`error` event, update tracker and stats.
    /// 6. Return the value or propagate the failure.
    pub fn call(&self, call_args: CallArgs) -> Result<Value> {
        let (correlation_id, _frame) = correlation::current_or_enter();
        let ctx = HijackContext::new(self.spec.identity.clone(), &call_args, &correlation_id);

        self.notify(EventKind::Call, &ctx);
        self.logger.log_call(&ctx.identity, &ctx.args, &ctx.kwargs, Some(correlation_id.clone()));

        let profiling = crate::config::profile_mode();
        let memory_before = if profiling { tracker::probe_rss_bytes() } else { None };
        let started = Instant::now();

        let mut outcome: Option<HijackResult> = None;
        for strategy in self.strategies() {
            if !strategy.should_intercept(&ctx) {
                continue;
            }
            // Strategy internal failures (including panics in user-supplied
            // callbacks) are swallowed: skip the strategy, keep the chain.
            let handled =
                catch_unwind(AssertUnwindSafe(|| strategy.handle(&ctx, &self.original)));
            match handled {
                Ok(Ok(result)) if result.executed => {
                    outcome = Some(result);
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(fault)) => {
                    self.log_strategy_fault(&ctx, strategy.name(), &fault.to_string());
                }
                Err(_) => {
                    self.log_strategy_fault(&ctx, strategy.name(), "strategy panicked");
                }
            }
        }

        let result = outcome.unwrap_or_else(|| match (self.original)(&call_args) {
            Ok(value) => HijackResult::produced(value),
            Err(record) => HijackResult::failed(record),
        });

        let duration = started.elapsed();
        let memory_delta = match (memory_before, if profiling { tracker::probe_rss_bytes() } else { None }) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };

        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_args.lock() = Some(call_args);

        match result.error {
            Some(record) => {
                self.tracker.track(&ctx.identity, duration, memory_delta);
                self.tracker.track_error(&ctx.identity);
                self.logger.log_return(
                    &ctx.identity,
                    None,
                    duration,
                    Some(correlation_id),
                    Some(record.clone()),
                );
                self.notify(EventKind::Error, &ctx);
                if record.kind == "BlockedError" {
                    Err(MysticError::blocked(record.message))
                } else {
                    Err(MysticError::Original(record))
                }
            }
            None => {
                let value = result.result.unwrap_or(Value::Null);
                self.tracker.track(&ctx.identity, duration, memory_delta);
                *self.last_result.lock() = Some(value.clone());
                self.logger.log_return(
                    &ctx.identity,
                    Some(value.clone()),
                    duration,
                    Some(correlation_id),
                    None,
                );
                self.notify(EventKind::Return, &ctx);
                Ok(value)
            }
        }
    }

    fn notify(&self, kind: EventKind, ctx: &HijackContext) {
        let notification = HijackNotification {
            kind,
            identity: ctx.identity.clone(),
            correlation_id: ctx.correlation_id.clone(),
            ts: Utc::now(),
        };
        for notifier in self.notifiers.lock().iter() {
            // Best-effort: a panicking subscriber never affects the call.
            let _ = catch_unwind(AssertUnwindSafe(|| notifier(&notification)));
        }
    }

    fn log_strategy_fault(&self, ctx: &HijackContext, strategy: &str, fault: &str) {
        let event = CallEvent::new(EventKind::Error, ctx.correlation_id.clone())
            .with_identity(ctx.identity.clone())
            .with_meta("strategy_fault", Value::String(strategy.to_string()))
            .with_meta("fault", Value::String(fault.to_string()));
        self.logger.emit(event);
    }
}

impl std::fmt::Debug for CallHijacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHijacker")
            .field("identity", &self.spec.identity)
            .field("strategies", &self.strategy_names())
            .field("call_count", &self.call_count())
            .finish()
    }
}
