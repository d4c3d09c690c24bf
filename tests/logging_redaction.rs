//! Call logging, redaction and correlation across the public surface.

use mystic::logger::{decorators, CallLogger, EventKind};
use mystic::{CallArgs, FunctionSpec, LogFormat, Redactor};
use serde_json::json;
use std::sync::Arc;

fn login_spec() -> FunctionSpec {
    FunctionSpec::new("auth", "login", |args: &CallArgs| {
        Ok(json!({"user": args.positional[0].clone(), "session": "s-1"}))
    })
}

#[test]
fn redaction_masks_credentials_but_not_usernames() {
    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, true));
    let wrapped = decorators::log_calls_and_returns(login_spec(), Some(Arc::clone(&logger)));

    wrapped.handler()(&CallArgs::positional(vec![
        json!("alice"),
        json!("password=hunter2"),
    ]))
    .unwrap();

    let events = logger.recent(10);
    assert_eq!(events.len(), 2);
    let call = &events[0];
    let args = call.args.as_ref().unwrap();
    assert_eq!(args[0], json!("alice"));
    assert_eq!(args[1], json!("password=****"));
}

#[test]
fn call_and_return_share_one_correlation_id() {
    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, true));
    let wrapped = decorators::log_calls_and_returns(login_spec(), Some(Arc::clone(&logger)));

    wrapped.handler()(&CallArgs::positional(vec![json!("alice"), json!("pw")])).unwrap();

    let events = logger.recent(10);
    assert_eq!(events[0].kind, EventKind::Call);
    assert_eq!(events[1].kind, EventKind::Return);
    assert_eq!(events[0].correlation_id, events[1].correlation_id);
    assert!(!events[0].correlation_id.is_empty());
}

#[test]
fn redaction_is_idempotent_and_identity_on_clean_values() {
    let redactor = Redactor::new();
    let samples = [
        json!("password=hunter2 api_key=zzz"),
        json!({"note": "token=abc", "card": "4111 1111 1111 1111"}),
        json!(["secret=s", {"ssn": "123-45-6789"}]),
        json!({"clean": ["no", "secrets", 42]}),
    ];
    for sample in &samples {
        let once = redactor.redact_value(sample);
        let twice = redactor.redact_value(&once);
        assert_eq!(once, twice, "redaction must be idempotent for {sample}");
    }

    let clean = json!({"user": "alice", "items": [1, 2, 3], "note": "hello"});
    assert_eq!(redactor.redact_value(&clean), clean);
}

#[test]
fn subscribers_receive_events_in_order() {
    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
    let seen: Arc<parking_lot::Mutex<Vec<String>>> =
        Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    logger.add_subscriber(move |event| {
        seen_clone.lock().push(event.correlation_id.clone());
    });

    let identity = mystic::FunctionIdentity::new("auth", "ping");
    for i in 0..3 {
        logger.log_call(&identity, &[], &serde_json::Map::new(), Some(format!("c-{i}")));
    }
    assert_eq!(*seen.lock(), vec!["c-0", "c-1", "c-2"]);
}

#[test]
fn late_subscribers_can_read_recent_history() {
    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
    let identity = mystic::FunctionIdentity::new("auth", "ping");
    for i in 0..5 {
        logger.log_call(&identity, &[json!(i)], &serde_json::Map::new(), Some(format!("c-{i}")));
    }

    let recent = logger.recent(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].correlation_id, "c-3");
    assert_eq!(recent[1].correlation_id, "c-4");
}

#[test]
fn nested_calls_inherit_the_outer_correlation_id() {
    mystic::correlation::clear();
    let outer = mystic::correlation::generate();
    let frame = mystic::correlation::enter(outer.clone());

    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, false));
    let identity = mystic::FunctionIdentity::new("auth", "inner");
    let used = logger.log_call(&identity, &[], &serde_json::Map::new(), None);
    assert_eq!(used, outer);

    drop(frame);
    mystic::correlation::clear();
}

#[test]
fn user_patterns_run_before_builtins() {
    let redactor = Redactor::new()
        .with_pattern(r"session-[a-z0-9]+", "session-[redacted]")
        .unwrap();
    let logger = Arc::new(CallLogger::new(LogFormat::JsonRpc, true).with_redactor(redactor));
    let identity = mystic::FunctionIdentity::new("auth", "resume");

    logger.log_call(
        &identity,
        &[json!("session-abc123"), json!("token=t1")],
        &serde_json::Map::new(),
        Some("c-1".into()),
    );
    let event = logger.recent(1).pop().unwrap();
    let args = event.args.as_ref().unwrap();
    assert_eq!(args[0], json!("session-[redacted]"));
    assert_eq!(args[1], json!("token=****"));
}
