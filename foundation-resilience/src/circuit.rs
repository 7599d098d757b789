//! Three-state circuit breaker.
//!
//! Transitions: CLOSED→OPEN when `failure_count` reaches the threshold,
//! OPEN→HALF_OPEN after the recovery timeout, HALF_OPEN→CLOSED on a probe
//! success, HALF_OPEN→OPEN on a probe failure. Exactly one half-open probe
//! is admitted at a time. Sync ([`CircuitBreaker::call`]) and async
//! ([`CircuitBreaker::call_async`]) execution share the same state, so an
//! application can switch styles without losing history.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use foundation_errors::{FoundationError, Result};
use foundation_logging::{get_logger, Logger};

use crate::retry::RetryableError;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Error surface of a breaker-guarded call: either the circuit rejected
/// the call, or the callable itself failed.
#[derive(Debug)]
pub enum BreakerCallError<E> {
    /// The circuit is OPEN (or a half-open probe is already in flight);
    /// the callable was never invoked.
    Rejected(FoundationError),
    /// The callable ran and failed; the original error, unchanged.
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for BreakerCallError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerCallError::Rejected(err) => write!(f, "{err}"),
            BreakerCallError::Inner(err) => write!(f, "{err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerCallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerCallError::Rejected(err) => Some(err),
            BreakerCallError::Inner(err) => Some(err),
        }
    }
}

impl<E> BreakerCallError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerCallError::Inner(err) => Some(err),
            BreakerCallError::Rejected(_) => None,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

/// The breaker. Construct through [`CircuitBreaker::builder`]; share via
/// `Arc` across callers and execution styles.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    /// Error kinds that count as failures; empty means every error counts.
    expected_kinds: HashSet<String>,
    state: Mutex<BreakerState>,
    /// Admission lock for the single half-open probe. A tokio mutex so the
    /// owned guard can be held across the probe's await point.
    probe: Arc<tokio::sync::Mutex<()>>,
    logger: Logger,
}

impl CircuitBreaker {
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder {
        CircuitBreakerBuilder {
            name: name.into(),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            expected_kinds: HashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current state, applying a pending OPEN→HALF_OPEN transition if
    /// the recovery timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.maybe_half_open(&mut state);
        state.state
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Forces the breaker back to CLOSED with zeroed counters.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.half_open_successes = 0;
        state.last_failure = None;
    }

    /// Runs a synchronous callable through the breaker.
    pub fn call<T, E, F>(&self, f: F) -> std::result::Result<T, BreakerCallError<E>>
    where
        E: RetryableError + 'static,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        let _probe = self.admit().map_err(BreakerCallError::Rejected)?;
        match f() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure(&error);
                Err(BreakerCallError::Inner(error))
            }
        }
    }

    /// Runs an async callable through the breaker. Dropping the returned
    /// future cancels the callable; cancellation is not a failure and
    /// leaves the state untouched.
    pub async fn call_async<T, E, F, Fut>(&self, f: F) -> std::result::Result<T, BreakerCallError<E>>
    where
        E: RetryableError + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        let _probe = self.admit().map_err(BreakerCallError::Rejected)?;
        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(error) => {
                self.on_failure(&error);
                Err(BreakerCallError::Inner(error))
            }
        }
    }

    // If OPEN and the recovery timeout elapsed, move to HALF_OPEN.
    fn maybe_half_open(&self, state: &mut BreakerState) {
        if state.state == CircuitState::Open {
            let recovered = state
                .last_failure
                .map(|at| at.elapsed() >= self.recovery_timeout)
                .unwrap_or(true);
            if recovered {
                state.state = CircuitState::HalfOpen;
                state.half_open_successes = 0;
            }
        }
    }

    /// Gatekeeper: pass in CLOSED, reject in OPEN, admit one probe in
    /// HALF_OPEN.
    fn admit(&self) -> Result<Option<tokio::sync::OwnedMutexGuard<()>>> {
        let mut state = self.state.lock();
        self.maybe_half_open(&mut state);
        match state.state {
            CircuitState::Closed => Ok(None),
            CircuitState::Open => Err(self.open_error("circuit is open")),
            CircuitState::HalfOpen => match Arc::clone(&self.probe).try_lock_owned() {
                Ok(guard) => Ok(Some(guard)),
                Err(_) => Err(self.open_error("half-open probe already in flight")),
            },
        }
    }

    fn open_error(&self, reason: &str) -> FoundationError {
        FoundationError::new(
            foundation_errors::ErrorKind::CircuitOpen,
            format!("'{}': {reason}", self.name),
        )
        .with_context("circuit", &self.name)
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Closed;
                state.failure_count = 0;
                state.half_open_successes += 1;
                state.last_failure = None;
                self.logger
                    .info("circuit_closed", &[("circuit", self.name.clone().into())]);
            }
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure<E: RetryableError>(&self, error: &E) {
        if !self.expected_kinds.is_empty() && !self.expected_kinds.contains(error.error_kind()) {
            // Unexpected kinds propagate without affecting breaker state.
            return;
        }
        let mut state = self.state.lock();
        match state.state {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.last_failure = Some(Instant::now());
                self.log_opened(error, "probe_failed");
            }
            CircuitState::Closed => {
                state.failure_count += 1;
                state.last_failure = Some(Instant::now());
                if state.failure_count >= self.failure_threshold {
                    state.state = CircuitState::Open;
                    self.log_opened(error, "threshold_reached");
                }
            }
            CircuitState::Open => {
                state.last_failure = Some(Instant::now());
            }
        }
    }

    fn log_opened<E: RetryableError>(&self, error: &E, reason: &str) {
        self.logger.error(
            "circuit_opened",
            &[
                ("circuit", self.name.clone().into()),
                ("reason", reason.into()),
                ("error_kind", error.error_kind().into()),
                ("error_message", error.to_string().into()),
            ],
        );
    }
}

/// Builder for [`CircuitBreaker`]; `build` registers the breaker in the
/// process-wide registry so coordinated resets can reach it.
pub struct CircuitBreakerBuilder {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    expected_kinds: HashSet<String>,
}

impl CircuitBreakerBuilder {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Adds an error kind that counts as a failure. With none added, every
    /// error counts.
    pub fn expected_kind(mut self, kind: impl Into<String>) -> Self {
        self.expected_kinds.insert(kind.into());
        self
    }

    pub fn build(self) -> Arc<CircuitBreaker> {
        let breaker = Arc::new(CircuitBreaker {
            name: self.name,
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            expected_kinds: self.expected_kinds,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
            probe: Arc::new(tokio::sync::Mutex::new(())),
            logger: get_logger("foundation.circuit"),
        });
        registry().lock().push(Arc::downgrade(&breaker));
        breaker
    }
}

fn registry() -> &'static Mutex<Vec<Weak<CircuitBreaker>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<CircuitBreaker>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Resets every live breaker to CLOSED (coordinated reset, step 7) and
/// prunes dropped ones from the registry.
pub fn reset_all_circuit_breakers() {
    let mut breakers = registry().lock();
    breakers.retain(|weak| match weak.upgrade() {
        Some(breaker) => {
            breaker.reset();
            true
        }
        None => false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail() -> std::result::Result<(), FoundationError> {
        Err(FoundationError::internal("downstream sad"))
    }

    fn breaker(threshold: u32, timeout_ms: u64) -> Arc<CircuitBreaker> {
        CircuitBreaker::builder("test")
            .failure_threshold(threshold)
            .recovery_timeout(Duration::from_millis(timeout_ms))
            .build()
    }

    #[test]
    fn test_closed_resets_failures_on_success() {
        let breaker = breaker(3, 50);
        let _ = breaker.call(fail);
        let _ = breaker.call(fail);
        assert_eq!(breaker.failure_count(), 2);

        breaker.call(|| Ok::<_, FoundationError>(())).unwrap();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_opens_at_threshold_and_rejects() {
        let breaker = breaker(2, 10_000);
        let _ = breaker.call(fail);
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);

        let mut invoked = false;
        let result = breaker.call(|| {
            invoked = true;
            fail()
        });
        assert!(!invoked, "open circuit must not invoke the callable");
        match result.unwrap_err() {
            BreakerCallError::Rejected(err) => assert_eq!(err.code(), "CIRCUIT_OPEN"),
            BreakerCallError::Inner(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_open_probe_close_cycle() {
        let breaker = breaker(2, 50);
        let _ = breaker.call(fail);
        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.call(|| Ok::<_, FoundationError>(())).unwrap();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = breaker(1, 20);
        let _ = breaker.call(fail);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let _ = breaker.call(fail);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_single_probe_admission() {
        let breaker = breaker(1, 10);
        let _ = breaker.call(fail);
        std::thread::sleep(Duration::from_millis(20));

        // First probe admitted and held in flight.
        let first_guard = breaker.admit().unwrap();
        assert!(first_guard.is_some());

        // Second caller is rejected while the probe is pending.
        let second = breaker.admit();
        assert!(second.is_err());
        drop(first_guard);
    }

    #[test]
    fn test_unexpected_kinds_do_not_count() {
        let breaker = CircuitBreaker::builder("picky")
            .failure_threshold(1)
            .expected_kind("INTEGRITY_ERROR")
            .build();

        let result = breaker.call(|| Err::<(), _>(FoundationError::validation("ignored")));
        assert!(matches!(result, Err(BreakerCallError::Inner(_))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);

        let _ = breaker.call(|| Err::<(), _>(FoundationError::integrity("counted")));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_sync_and_async_share_state() {
        let breaker = breaker(2, 10_000);
        let _ = breaker.call(fail);
        let _ = breaker
            .call_async(|| async { fail() })
            .await;
        // One sync + one async failure crossed the threshold together.
        assert_eq!(breaker.state(), CircuitState::Open);

        let rejected = breaker.call_async(|| async { fail() }).await;
        assert!(matches!(rejected, Err(BreakerCallError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_failure() {
        let breaker = breaker(1, 10_000);
        let in_flight = breaker.call_async(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            fail()
        });
        tokio::select! {
            _ = in_flight => panic!("must not complete"),
            _ = tokio::task::yield_now() => {}
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_reset_all() {
        let a = breaker(1, 10_000);
        let b = breaker(1, 10_000);
        let _ = a.call(fail);
        let _ = b.call(fail);
        assert_eq!(a.state(), CircuitState::Open);

        reset_all_circuit_breakers();
        assert_eq!(a.state(), CircuitState::Closed);
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(a.failure_count(), 0);
    }
}
