//! End-to-end interception scenarios against the public API.

use mystic::{
    analyze, cache, config, hijack, mock, register, AnalysisStrategy, CallArgs, Environment,
    FunctionSpec, MockStrategy, Strategy,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// The environment tag and registry are process-global; serialize the tests
// that flip the environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn register_counting(
    module: &str,
    name: &str,
    delay: Duration,
) -> Arc<AtomicUsize> {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);
    let spec = FunctionSpec::new(module, name, move |args: &CallArgs| {
        counter_clone.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        Ok(json!(args.positional[0].as_i64().unwrap_or(0) * 2))
    });
    register(spec).unwrap();
    counter
}

#[test]
fn cache_hit_skips_the_original() {
    let calls = register_counting("scenario_cache", "slow_double", Duration::from_millis(50));
    let wrapper =
        hijack("scenario_cache.slow_double", vec![cache(Duration::from_secs(3600))]).unwrap();

    let t1 = Instant::now();
    assert_eq!(wrapper.call(CallArgs::positional(vec![json!(5)])).unwrap(), json!(10));
    let d1 = t1.elapsed();

    let t2 = Instant::now();
    assert_eq!(wrapper.call(CallArgs::positional(vec![json!(5)])).unwrap(), json!(10));
    let d2 = t2.elapsed();

    assert!(d1 >= Duration::from_millis(50), "first call ran the original: {d1:?}");
    assert!(d2 < Duration::from_millis(5), "second call should hit the cache: {d2:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn mock_gated_by_environment() {
    let _env = ENV_LOCK.lock();

    let spec = FunctionSpec::new("scenario_mock", "api", |_args: &CallArgs| {
        Ok(json!({"ok": false}))
    });
    register(spec).unwrap();
    let wrapper = hijack(
        "scenario_mock.api",
        vec![Strategy::Mock(
            MockStrategy::new(json!({"ok": true})).environments([Environment::Development]),
        )],
    )
    .unwrap();

    config::set_environment(Environment::Production);
    assert_eq!(wrapper.call(CallArgs::new()).unwrap(), json!({"ok": false}));

    config::set_environment(Environment::Development);
    assert_eq!(wrapper.call(CallArgs::new()).unwrap(), json!({"ok": true}));
}

#[test]
fn analysis_then_cache_chain() {
    let _env = ENV_LOCK.lock();
    config::set_environment(Environment::Development);

    let calls = register_counting("scenario_chain", "add_ctx", Duration::ZERO);
    let wrapper = hijack(
        "scenario_chain.add_ctx",
        vec![analyze(), cache(Duration::from_secs(60))],
    )
    .unwrap();

    wrapper.call(CallArgs::positional(vec![json!(7)])).unwrap();
    wrapper.call(CallArgs::positional(vec![json!(7)])).unwrap();

    // One underlying invocation (miss then hit), two passive observations.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let strategies = wrapper.strategies();
    let analysis_observations: usize = strategies
        .iter()
        .filter_map(|s| match s.as_ref() {
            Strategy::Analysis(a) => Some(a.observation_count()),
            _ => None,
        })
        .sum();
    assert_eq!(analysis_observations, 2);
    assert_eq!(wrapper.call_count(), 2);
}

#[test]
fn idempotent_hijack_appends_strategies() {
    register_counting("scenario_idem", "f", Duration::ZERO);

    let first = hijack("scenario_idem.f", vec![analyze()]).unwrap();
    let second = hijack("scenario_idem.f", vec![cache(Duration::from_secs(60))]).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.strategy_names(), vec!["analyze", "cache"]);
}

#[test]
fn strategy_order_is_deterministic() {
    register_counting("scenario_order", "f", Duration::ZERO);
    let wrapper = hijack(
        "scenario_order.f",
        vec![
            cache(Duration::from_secs(60)),
            mystic::block("off"),
            Strategy::Analysis(AnalysisStrategy::new()),
        ],
    )
    .unwrap();
    // Block is Critical; cache and analysis keep insertion order at Normal.
    assert_eq!(wrapper.strategy_names(), vec!["block", "cache", "analyze"]);
}

#[test]
fn blocked_error_propagates() {
    register_counting("scenario_block", "restricted", Duration::ZERO);
    let wrapper = hijack(
        "scenario_block.restricted",
        vec![Strategy::Block(mystic::BlockStrategy::new("maintenance").raising())],
    )
    .unwrap();

    let err = wrapper.call(CallArgs::new()).unwrap_err();
    assert!(matches!(err, mystic::MysticError::Blocked { .. }));
    assert!(err.to_string().contains("maintenance"));
}

#[test]
fn unhijack_restores_original_behavior() {
    let calls = register_counting("scenario_restore", "g", Duration::ZERO);
    hijack("scenario_restore.g", vec![mock(json!("mocked"))]).unwrap();

    {
        let _env = ENV_LOCK.lock();
        config::set_environment(Environment::Development);
        assert_eq!(
            mystic::call("scenario_restore.g", CallArgs::positional(vec![json!(3)])).unwrap(),
            json!("mocked")
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    mystic::unhijack("scenario_restore.g").unwrap();
    assert_eq!(
        mystic::call("scenario_restore.g", CallArgs::positional(vec![json!(3)])).unwrap(),
        json!(6)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn metrics_accumulate_per_identity() {
    register_counting("scenario_metrics", "h", Duration::from_millis(5));
    let wrapper = hijack("scenario_metrics.h", vec![]).unwrap();

    for i in 0..4 {
        wrapper.call(CallArgs::positional(vec![json!(i)])).unwrap();
    }

    let tracker = mystic::tracker::global();
    let entry = tracker
        .get(&mystic::FunctionIdentity::new("scenario_metrics", "h"))
        .expect("tracked entry");
    assert_eq!(entry.call_count, 4);
    assert!(entry.min_time >= 0.005);
    assert!(entry.max_time >= entry.min_time);
    assert!((entry.total_time / entry.call_count as f64 - entry.mean).abs() < 1e-9);
}

#[test]
fn conditional_delegates_by_predicate() {
    register_counting("scenario_cond", "f", Duration::ZERO);
    let wrapper = hijack(
        "scenario_cond.f",
        vec![Strategy::Conditional(mystic::ConditionalStrategy::new(
            |ctx| ctx.args[0].as_i64().unwrap_or(0) < 0,
            Strategy::Block(
                mystic::BlockStrategy::new("negative input").with_sentinel(Value::Null),
            ),
        ))],
    )
    .unwrap();

    // Negative: blocked with the sentinel.
    assert_eq!(wrapper.call(CallArgs::positional(vec![json!(-4)])).unwrap(), Value::Null);
    // Positive: predicate false, no false-branch, falls through.
    assert_eq!(wrapper.call(CallArgs::positional(vec![json!(4)])).unwrap(), json!(8));
}
