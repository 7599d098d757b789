//! Retry policies and executors.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use foundation_errors::FoundationError;
use foundation_logging::{get_logger, Logger};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    Fibonacci,
}

/// Classifies an error for retry (and circuit-breaker) decisions.
///
/// `error_kind` is a stable tag matched against
/// [`RetryPolicy::retryable_errors`]; HTTP-like errors may additionally
/// expose a status code.
pub trait RetryableError: std::error::Error {
    fn error_kind(&self) -> &str;

    fn status_code(&self) -> Option<u16> {
        None
    }
}

impl RetryableError for FoundationError {
    fn error_kind(&self) -> &str {
        self.code()
    }
}

/// Purely declarative retry settings; executors consume it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
    /// Error-kind tags eligible for retry; `None` retries any error.
    pub retryable_errors: Option<HashSet<String>>,
    /// HTTP-like status codes eligible for retry.
    pub retryable_status_codes: Option<HashSet<u16>>,
    /// Include the exception chain in retry logs.
    pub log_tracebacks: bool,
}

impl RetryPolicy {
    /// A policy with the given attempt limit (clamped to at least 1),
    /// fixed backoff, 100ms base delay, and 30s cap.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffStrategy::Fixed,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: false,
            retryable_errors: None,
            retryable_status_codes: None,
            log_tracebacks: false,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        if self.max_delay < self.base_delay {
            self.max_delay = self.base_delay;
        }
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Restricts retries to the given error-kind tags.
    pub fn with_retryable_errors<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_retryable_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retryable_status_codes = Some(codes.into_iter().collect());
        self
    }

    pub fn with_log_tracebacks(mut self, log_tracebacks: bool) -> Self {
        self.log_tracebacks = log_tracebacks;
        self
    }

    /// Whether the error may be retried under this policy.
    pub fn is_retryable<E: RetryableError>(&self, error: &E) -> bool {
        if let (Some(codes), Some(status)) = (&self.retryable_status_codes, error.status_code()) {
            if codes.contains(&status) {
                return true;
            }
        }
        match &self.retryable_errors {
            None => true,
            Some(kinds) => kinds.contains(error.error_kind()),
        }
    }

    /// The delay after the `attempt`-th failure (1-based), before jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt - 1)),
            BackoffStrategy::Fibonacci => self.base_delay.saturating_mul(fibonacci(attempt)),
        };
        delay.min(self.max_delay)
    }

    fn effective_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.5..=1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * factor).min(self.max_delay)
    }
}

/// `fib(1) = fib(2) = 1`, saturating well past any sane attempt count.
fn fibonacci(n: u32) -> u32 {
    let (mut a, mut b) = (1u32, 1u32);
    for _ in 2..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    if n <= 2 {
        1
    } else {
        b
    }
}

/// Executes callables under a [`RetryPolicy`].
///
/// The success boundary is the callable's return: a function that returns
/// an iterator (or other lazy value) counts as succeeded once construction
/// returns, and errors raised by later consumption are outside this
/// executor's scope. On exhaustion the *original* error of the final
/// attempt is returned, never a wrapper.
pub struct RetryExecutor {
    policy: RetryPolicy,
    logger: Logger,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            logger: get_logger("foundation.retry"),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Blocking variant; delays use `std::thread::sleep`.
    pub fn execute_sync<T, E, F>(&self, function_name: &str, mut f: F) -> Result<T, E>
    where
        E: RetryableError + 'static,
        F: FnMut() -> Result<T, E>,
    {
        for attempt in 1..=self.policy.max_attempts {
            match f() {
                Ok(value) => return Ok(value),
                Err(error) => match self.handle_failure(function_name, attempt, &error) {
                    Some(delay) => std::thread::sleep(delay),
                    None => return Err(error),
                },
            }
        }
        unreachable!("retry loop returns on final attempt")
    }

    /// Async variant; delays use the cooperative `tokio::time::sleep`, so
    /// cancellation while waiting aborts immediately without another
    /// attempt.
    pub async fn execute_async<T, E, F, Fut>(&self, function_name: &str, mut f: F) -> Result<T, E>
    where
        E: RetryableError + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        for attempt in 1..=self.policy.max_attempts {
            match f().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.handle_failure(function_name, attempt, &error) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(error),
                },
            }
        }
        unreachable!("retry loop returns on final attempt")
    }

    /// Classifies a failure; returns the delay before the next attempt, or
    /// `None` when the error must propagate (non-retryable or exhausted).
    fn handle_failure<E>(&self, function_name: &str, attempt: u32, error: &E) -> Option<Duration>
    where
        E: RetryableError + 'static,
    {
        if !self.policy.is_retryable(error) {
            self.logger.debug(
                "retry_not_retryable",
                &[
                    ("function_name", function_name.into()),
                    ("error_kind", error.error_kind().into()),
                ],
            );
            return None;
        }

        let delay = self.policy.effective_delay(attempt);
        if attempt >= self.policy.max_attempts {
            // Same field set as the intermediate WARNING, plus the
            // exhaustion marker.
            let fields = [
                ("function_name", function_name.into()),
                ("attempt", attempt.into()),
                ("delay_ms", (delay.as_millis() as u64).into()),
                ("error_kind", error.error_kind().into()),
                ("error_message", error.to_string().into()),
                ("attempts_exhausted", true.into()),
            ];
            if self.policy.log_tracebacks {
                self.logger.exception("retry_attempt", error, &fields);
            } else {
                self.logger.error("retry_attempt", &fields);
            }
            return None;
        }

        self.logger.warning(
            "retry_attempt",
            &[
                ("function_name", function_name.into()),
                ("attempt", attempt.into()),
                ("delay_ms", (delay.as_millis() as u64).into()),
                ("error_kind", error.error_kind().into()),
                ("error_message", error.to_string().into()),
            ],
        );
        Some(delay)
    }
}

/// Wraps a callable so every invocation runs under the policy: the
/// decorator form as ordinary function composition.
pub fn with_retry_sync<T, E, F>(
    policy: RetryPolicy,
    function_name: &str,
    f: F,
) -> impl Fn() -> Result<T, E>
where
    E: RetryableError + 'static,
    F: Fn() -> Result<T, E>,
{
    let executor = RetryExecutor::new(policy);
    let function_name = function_name.to_string();
    move || executor.execute_sync(&function_name, &f)
}
