//! End-to-end scenarios exercising the subsystems together.
//!
//! Everything here touches process-wide state (the log stream, the
//! pipeline, environment variables), so each test serializes on one lock
//! and finishes with a coordinated reset.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use foundation_config::{ConfigMap, ConfigSource, DictLoader, EnvLoader, FieldSpec, MultiSourceLoader};
use foundation_errors::FoundationError;
use foundation_hub::{get_hub, reset_foundation_state, Component};
use foundation_logging::{
    get_logger, init_logging, rate_limit_drops, CaptureStream, Level, LoggingConfig,
};
use foundation_resilience::{
    BackoffStrategy, BreakerCallError, CircuitBreaker, CircuitState, FallbackChain,
    RetryExecutor, RetryPolicy,
};
use foundation_trace::Span;

static E2E_LOCK: Mutex<()> = Mutex::new(());

fn setup_json_logging(capture: &CaptureStream) {
    reset_foundation_state();
    capture.install();
    init_logging(
        LoggingConfig::default()
            .with_default_level(Level::Trace)
            .with_json_output(true),
    )
    .unwrap();
}

fn parsed_lines(capture: &CaptureStream) -> Vec<Value> {
    capture
        .lines()
        .iter()
        .map(|line| serde_json::from_str(line).expect("JSON log line"))
        .collect()
}

fn lines_with_event<'v>(lines: &'v [Value], event: &str) -> Vec<&'v Value> {
    lines
        .iter()
        .filter(|line| line["event"] == json!(event))
        .collect()
}

// Scenario: rate-limited logging: capacity 3, 5 rapid events, then
// replenishment after the bucket refills.
#[test]
fn rate_limited_logging_drops_and_replenishes() {
    let _lock = E2E_LOCK.lock();
    let capture = CaptureStream::new();
    reset_foundation_state();
    capture.install();
    init_logging(
        LoggingConfig::default()
            .with_default_level(Level::Info)
            .with_json_output(true)
            .with_rate_limit("app", 1.0, 3.0),
    )
    .unwrap();

    let log = get_logger("app");
    for i in 0..5 {
        log.info(&format!("burst_{i}"), &[]);
    }

    assert_eq!(capture.lines().len(), 3);
    assert_eq!(rate_limit_drops("app"), 2);

    // One token replenishes at 1.0/sec.
    std::thread::sleep(Duration::from_millis(1200));
    log.info("after_refill", &[]);
    let lines = parsed_lines(&capture);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3]["event"], json!("after_refill"));

    reset_foundation_state();
}

// Scenario: retry succeeds on the third attempt with exponential delays.
#[test]
fn retry_then_succeed_logs_warnings_only() {
    let _lock = E2E_LOCK.lock();
    let capture = CaptureStream::new();
    setup_json_logging(&capture);

    let policy = RetryPolicy::new(4)
        .with_backoff(BackoffStrategy::Exponential)
        .with_base_delay(Duration::from_millis(10))
        .with_retryable_errors(["FOUNDATION_ERROR"]);
    let executor = RetryExecutor::new(policy);

    let mut calls = 0;
    let result: Result<&str, FoundationError> = executor.execute_sync("fetch_quota", || {
        calls += 1;
        if calls <= 2 {
            Err(FoundationError::internal("transient"))
        } else {
            Ok("ok")
        }
    });

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls, 3);

    let lines = parsed_lines(&capture);
    let attempts = lines_with_event(&lines, "retry_attempt");
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|line| line["level"] == json!("WARNING")));
    assert!(attempts
        .iter()
        .all(|line| line["function_name"] == json!("fetch_quota")));
    // Exponential: ~10ms then ~20ms.
    assert_eq!(attempts[0]["delay_ms"], json!(10));
    assert_eq!(attempts[1]["delay_ms"], json!(20));
    assert!(attempts.iter().all(|line| line.get("attempts_exhausted").is_none()));

    reset_foundation_state();
}

// Scenario: retry exhaustion re-raises the original error and logs one
// exhausted ERROR.
#[test]
fn retry_exhaustion_surfaces_original_error() {
    let _lock = E2E_LOCK.lock();
    let capture = CaptureStream::new();
    setup_json_logging(&capture);

    let policy = RetryPolicy::new(4)
        .with_backoff(BackoffStrategy::Exponential)
        .with_base_delay(Duration::from_millis(5))
        .with_retryable_errors(["FOUNDATION_ERROR"]);
    let executor = RetryExecutor::new(policy);

    let mut calls = 0;
    let result: Result<(), FoundationError> = executor.execute_sync("always_down", || {
        calls += 1;
        Err(FoundationError::internal("oops").with_context("origin", "primary"))
    });

    assert_eq!(calls, 4);
    let err = result.unwrap_err();
    assert_eq!(err.message(), "oops");
    assert_eq!(err.context().get("origin").map(String::as_str), Some("primary"));

    let lines = parsed_lines(&capture);
    let attempts = lines_with_event(&lines, "retry_attempt");
    assert_eq!(attempts.len(), 4);
    let warnings: Vec<_> = attempts
        .iter()
        .filter(|line| line["level"] == json!("WARNING"))
        .collect();
    let errors: Vec<_> = attempts
        .iter()
        .filter(|line| line["level"] == json!("ERROR"))
        .collect();
    assert_eq!(warnings.len(), 3);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["attempts_exhausted"], json!(true));
    // The exhausted line carries the same field set as the warnings:
    // exponential backoff puts attempt 4 at 5ms * 2^3.
    assert_eq!(errors[0]["delay_ms"], json!(40));
    assert!(warnings.iter().all(|line| line.get("delay_ms").is_some()));

    reset_foundation_state();
}

// Scenario: circuit opens at the threshold, rejects, probes, closes.
#[test]
fn circuit_breaker_open_probe_close() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();

    let breaker = CircuitBreaker::builder("payments")
        .failure_threshold(2)
        .recovery_timeout(Duration::from_millis(50))
        .build();

    let fail = || Err::<(), _>(FoundationError::internal("downstream"));
    let _ = breaker.call(fail);
    let _ = breaker.call(fail);
    assert_eq!(breaker.state(), CircuitState::Open);

    let mut invoked = false;
    let rejected = breaker.call(|| {
        invoked = true;
        fail()
    });
    assert!(!invoked);
    assert!(matches!(rejected, Err(BreakerCallError::Rejected(_))));

    std::thread::sleep(Duration::from_millis(60));
    breaker.call(|| Ok::<_, FoundationError>(())).unwrap();
    assert_eq!(breaker.state(), CircuitState::Closed);

    reset_foundation_state();
}

// Scenario: fallback chain returns the second slot's value; the third is
// never invoked.
#[test]
fn fallback_chain_second_slot_wins() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();

    let third_invoked = Arc::new(Mutex::new(false));
    let probe = Arc::clone(&third_invoked);
    let chain = FallbackChain::new()
        .with_fallback("primary", || {
            Err::<u32, _>(FoundationError::internal("primary down"))
        })
        .with_fallback("secondary", || Ok::<_, FoundationError>(42))
        .with_fallback("tertiary", move || {
            *probe.lock() = true;
            Ok::<_, FoundationError>(0)
        });

    assert_eq!(chain.execute().unwrap(), 42);
    assert!(!*third_invoked.lock());

    reset_foundation_state();
}

// Scenario: spans propagate within a task but not across unlinked spawns.
#[tokio::test]
async fn trace_propagation_across_tasks() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();

    let span_a = Span::new("a");
    let a_trace = span_a.trace_id().to_string();
    let a_span_id = span_a.span_id().to_string();

    span_a
        .in_scope(async {
            // Same task: child links to the active span.
            let span_c = Span::new("c");
            assert_eq!(span_c.trace_id(), a_trace);
            assert_eq!(span_c.parent_id(), Some(a_span_id.as_str()));

            // Unlinked spawn: no inheritance.
            let b = tokio::spawn(async {
                let span_b = Span::new("b");
                (span_b.trace_id().to_string(), span_b.parent_id().is_none())
            })
            .await
            .unwrap();
            assert_ne!(b.0, a_trace);
            assert!(b.1);
        })
        .await;

    reset_foundation_state();
}

// Scenario: configuration source precedence DEFAULT < FILE < ENV.
#[tokio::test]
async fn config_source_precedence() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();

    let schema = vec![FieldSpec::new("port")
        .env_var("PROVIDE_PORT")
        .default(json!(8000))
        .converter(foundation_config::convert::integer())];

    std::env::set_var("PROVIDE_PORT", "7000");
    let snapshot = MultiSourceLoader::new()
        .with_loader(Arc::new(
            DictLoader::new(ConfigMap::from([("port".to_string(), json!(9000))]))
                .with_source(ConfigSource::File),
        ))
        .with_loader(Arc::new(EnvLoader::new()))
        .load(&schema)
        .await
        .unwrap();
    std::env::remove_var("PROVIDE_PORT");

    assert_eq!(snapshot.get("port"), Some(&json!(7000)));
    assert_eq!(snapshot.get_source("port"), Some(ConfigSource::Env));

    reset_foundation_state();
}

// Logs emitted inside a span carry its identity.
#[tokio::test]
async fn log_events_carry_trace_context() {
    let _lock = E2E_LOCK.lock();
    let capture = CaptureStream::new();
    setup_json_logging(&capture);

    let span = Span::new("request");
    let trace_id = span.trace_id().to_string();
    let span_id = span.span_id().to_string();
    span.in_scope(async {
        get_logger("app").info("inside_span", &[]);
    })
    .await;
    get_logger("app").info("outside_span", &[]);

    let lines = parsed_lines(&capture);
    assert_eq!(lines[0]["trace_id"], json!(trace_id));
    assert_eq!(lines[0]["span_id"], json!(span_id));
    assert!(lines[1].get("trace_id").is_none());

    reset_foundation_state();
}

// Foundation initialization is idempotent and strict re-init with a
// different configuration fails.
#[test]
fn initialize_foundation_once_only() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();
    let capture = CaptureStream::new();
    capture.install();

    let hub = get_hub();
    let config = LoggingConfig::default()
        .with_default_level(Level::Info)
        .with_json_output(true);
    hub.initialize_foundation(Some(config.clone()), None, true)
        .unwrap();
    assert!(hub.is_foundation_initialized());

    // Equal configuration: no-op.
    hub.initialize_foundation(Some(config), None, true).unwrap();

    // Different configuration: strict fails, lenient warns and keeps.
    let other = LoggingConfig::default().with_default_level(Level::Trace);
    let err = hub
        .initialize_foundation(Some(other.clone()), None, true)
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_EXISTS");
    hub.initialize_foundation(Some(other), None, false).unwrap();

    // The original config is still in force: DEBUG is filtered.
    get_logger("app").debug("hidden", &[]);
    get_logger("app").info("visible", &[]);
    let lines = parsed_lines(&capture);
    assert_eq!(
        lines
            .iter()
            .filter(|line| line["event"] == json!("visible"))
            .count(),
        1
    );
    assert!(lines.iter().all(|line| line["event"] != json!("hidden")));

    reset_foundation_state();
}

// Concurrent initialize_foundation callers: exactly one initializes.
#[test]
fn concurrent_foundation_initialization() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();
    let capture = CaptureStream::new();
    capture.install();

    let mut handles = Vec::new();
    for _ in 0..8 {
        handles.push(std::thread::spawn(|| {
            get_hub().initialize_foundation(
                Some(LoggingConfig::default().with_default_level(Level::Info)),
                None,
                true,
            )
        }));
    }
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert!(get_hub().is_foundation_initialized());

    reset_foundation_state();
}

// The coordinated reset clears every subsystem and allows clean re-init.
#[tokio::test]
async fn reset_restores_pristine_state() {
    let _lock = E2E_LOCK.lock();
    reset_foundation_state();
    let capture = CaptureStream::new();
    capture.install();

    struct Noop;
    #[async_trait::async_trait]
    impl Component for Noop {}

    let hub = get_hub();
    hub.initialize_foundation(
        Some(LoggingConfig::default().with_default_level(Level::Info)),
        None,
        true,
    )
    .unwrap();
    hub.add_component("widget", Arc::new(Noop)).apply().unwrap();
    hub.add_command("run", Arc::new(|_| Ok(Value::Null)))
        .apply()
        .unwrap();

    let breaker = CircuitBreaker::builder("reset_me")
        .failure_threshold(1)
        .recovery_timeout(Duration::from_secs(600))
        .build();
    let _ = breaker.call(|| Err::<(), _>(FoundationError::internal("x")));
    assert_eq!(breaker.state(), CircuitState::Open);

    reset_foundation_state();

    assert!(!hub.is_foundation_initialized());
    assert!(hub.list_components(None).is_empty());
    assert!(hub.list_commands().is_empty());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(!foundation_logging::is_initialized());

    // Clean re-initialization afterwards.
    hub.initialize_foundation(None, None, true).unwrap();
    assert!(hub.is_foundation_initialized());
    reset_foundation_state();
}
