//! Logging combinators
//!
//! These wrap a [`FunctionSpec`]'s handler so that every invocation emits
//! call and/or return events, without the caller going through the
//! interception engine. Each combinator accepts an optional logger handle;
//! the default is the module-level singleton.

use super::CallLogger;
use crate::function::{FunctionSpec, NativeHandler};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Transform applied to a value before it is logged
pub type ValueFilter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Calls,
    Returns,
    Both,
}

/// Log both entries and exits
pub fn log_calls_and_returns(spec: FunctionSpec, logger: Option<Arc<CallLogger>>) -> FunctionSpec {
    wrap(spec, logger, Mode::Both, None, None, None)
}

/// Log entries only
pub fn log_calls_only(spec: FunctionSpec, logger: Option<Arc<CallLogger>>) -> FunctionSpec {
    wrap(spec, logger, Mode::Calls, None, None, None)
}

/// Log exits only
pub fn log_returns_only(spec: FunctionSpec, logger: Option<Arc<CallLogger>>) -> FunctionSpec {
    wrap(spec, logger, Mode::Returns, None, None, None)
}

/// Log entries and exits with stringified payloads truncated to
/// `max_length` characters.
pub fn detailed_log(
    spec: FunctionSpec,
    max_length: usize,
    logger: Option<Arc<CallLogger>>,
) -> FunctionSpec {
    wrap(spec, logger, Mode::Both, Some(max_length), None, None)
}

/// Log entries and exits, passing each argument through `arg_filter` and
/// the result through `return_filter` before they reach the event.
pub fn filtered_log(
    spec: FunctionSpec,
    arg_filter: Option<ValueFilter>,
    return_filter: Option<ValueFilter>,
    logger: Option<Arc<CallLogger>>,
) -> FunctionSpec {
    wrap(spec, logger, Mode::Both, None, arg_filter, return_filter)
}

fn wrap(
    spec: FunctionSpec,
    logger: Option<Arc<CallLogger>>,
    mode: Mode,
    max_length: Option<usize>,
    arg_filter: Option<ValueFilter>,
    return_filter: Option<ValueFilter>,
) -> FunctionSpec {
    let logger = logger.unwrap_or_else(super::global);
    let identity = spec.identity.clone();

    spec.map_handler(move |inner: NativeHandler| {
        let logger = Arc::clone(&logger);
        let identity = identity.clone();
        let arg_filter = arg_filter.clone();
        let return_filter = return_filter.clone();

        Arc::new(move |args| {
            let correlation_id = if mode != Mode::Returns {
                let logged_args: Vec<Value> = args
                    .positional
                    .iter()
                    .map(|v| shape(v, &arg_filter, max_length))
                    .collect();
                let logged_kwargs = args
                    .keyword
                    .iter()
                    .map(|(k, v)| (k.clone(), shape(v, &arg_filter, max_length)))
                    .collect();
                Some(logger.log_call(&identity, &logged_args, &logged_kwargs, None))
            } else {
                None
            };

            let started = Instant::now();
            let outcome = inner(args);

            if mode != Mode::Calls {
                let duration = started.elapsed();
                match &outcome {
                    Ok(value) => logger.log_return(
                        &identity,
                        Some(shape(value, &return_filter, max_length)),
                        duration,
                        correlation_id,
                        None,
                    ),
                    Err(record) => logger.log_return(
                        &identity,
                        None,
                        duration,
                        correlation_id,
                        Some(record.clone()),
                    ),
                }
            }
            outcome
        })
    })
}

fn shape(value: &Value, filter: &Option<ValueFilter>, max_length: Option<usize>) -> Value {
    let shaped = match filter {
        Some(f) => f(value),
        None => value.clone(),
    };
    match max_length {
        Some(limit) => truncate(shaped, limit),
        None => shaped,
    }
}

fn truncate(value: Value, limit: usize) -> Value {
    let rendered = value.to_string();
    if rendered.chars().count() <= limit {
        value
    } else {
        let cut: String = rendered.chars().take(limit).collect();
        Value::String(format!("{cut}…"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use crate::function::CallArgs;
    use crate::logger::EventKind;
    use serde_json::json;

    fn spec() -> FunctionSpec {
        FunctionSpec::new("auth", "login", |args| {
            Ok(json!({"user": args.positional[0].clone(), "ok": true}))
        })
    }

    #[test]
    fn test_call_and_return_events_share_id() {
        let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, true));
        let wrapped = log_calls_and_returns(spec(), Some(Arc::clone(&logger)));
        let args = CallArgs::positional(vec![json!("alice"), json!("password=hunter2")]);
        wrapped.handler()(&args).unwrap();

        let events = logger.recent(10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Call);
        assert_eq!(events[1].kind, EventKind::Return);
        assert_eq!(events[0].correlation_id, events[1].correlation_id);
        // Redaction ran before emission.
        assert_eq!(events[0].args.as_ref().unwrap()[1], json!("password=****"));
        assert_eq!(events[0].args.as_ref().unwrap()[0], json!("alice"));
    }

    #[test]
    fn test_calls_only_skips_return() {
        let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
        let wrapped = log_calls_only(spec(), Some(Arc::clone(&logger)));
        wrapped.handler()(&CallArgs::positional(vec![json!("bob")])).unwrap();
        let events = logger.recent(10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Call);
    }

    #[test]
    fn test_detailed_log_truncates() {
        let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
        let wrapped = detailed_log(spec(), 8, Some(Arc::clone(&logger)));
        let long = "x".repeat(64);
        wrapped.handler()(&CallArgs::positional(vec![json!(long)])).unwrap();
        let events = logger.recent(10);
        let logged = events[0].args.as_ref().unwrap()[0].as_str().unwrap().to_string();
        assert!(logged.chars().count() <= 9); // 8 + ellipsis
    }

    #[test]
    fn test_filtered_log_applies_filters() {
        let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
        let arg_filter: ValueFilter = Arc::new(|_| json!("<arg>"));
        let return_filter: ValueFilter = Arc::new(|v| json!({"keys": v.as_object().map(|o| o.len())}));
        let wrapped = filtered_log(spec(), Some(arg_filter), Some(return_filter), Some(Arc::clone(&logger)));
        wrapped.handler()(&CallArgs::positional(vec![json!("alice")])).unwrap();

        let events = logger.recent(10);
        assert_eq!(events[0].args.as_ref().unwrap()[0], json!("<arg>"));
        assert_eq!(events[1].result.as_ref().unwrap()["keys"], json!(2));
    }

    #[test]
    fn test_error_logged_as_error_event() {
        let failing = FunctionSpec::new("auth", "fail", |_| {
            Err(crate::error::ErrorRecord::new("ValueError", "nope"))
        });
        let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
        let wrapped = log_calls_and_returns(failing, Some(Arc::clone(&logger)));
        assert!(wrapped.handler()(&CallArgs::new()).is_err());

        let events = logger.recent(10);
        assert_eq!(events[1].kind, EventKind::Error);
        assert_eq!(events[1].error.as_ref().unwrap().kind, "ValueError");
    }
}
