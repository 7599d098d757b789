//! Token-bucket rate limiting, per logger name.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

/// Rate and burst size for one logger's bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSpec {
    /// Tokens added per second.
    pub rate: f64,
    /// Maximum (and initial) token count.
    pub capacity: f64,
}

struct Bucket {
    spec: RateLimitSpec,
    tokens: f64,
    last_refill: Instant,
    dropped: u64,
}

impl Bucket {
    fn new(spec: RateLimitSpec) -> Self {
        Self {
            spec,
            tokens: spec.capacity,
            last_refill: Instant::now(),
            dropped: 0,
        }
    }

    /// Lazily refills from monotonic elapsed time, clamped to capacity, and
    /// tries to take one token.
    fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.spec.rate)
            .clamp(0.0, self.spec.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            self.dropped += 1;
            false
        }
    }
}

/// The pipeline's rate-limit stage: one bucket per configured logger name.
/// Loggers without a configured limit pass through untouched.
pub struct RateLimiterSet {
    buckets: Mutex<HashMap<String, Bucket>>,
    specs: HashMap<String, RateLimitSpec>,
}

impl RateLimiterSet {
    pub fn new(specs: HashMap<String, RateLimitSpec>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            specs,
        }
    }

    /// Whether an event from `logger` may pass. Increments the bucket's
    /// drop counter on refusal. Returns the running drop count alongside so
    /// the pipeline can emit a periodic diagnostic.
    pub fn check(&self, logger: &str) -> RateDecision {
        let Some(spec) = self.specs.get(logger) else {
            return RateDecision::Allowed;
        };
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(logger.to_string())
            .or_insert_with(|| Bucket::new(*spec));
        if bucket.try_acquire(Instant::now()) {
            RateDecision::Allowed
        } else {
            RateDecision::Dropped {
                total_dropped: bucket.dropped,
            }
        }
    }

    /// Events dropped so far for a logger.
    pub fn dropped(&self, logger: &str) -> u64 {
        self.buckets
            .lock()
            .get(logger)
            .map(|bucket| bucket.dropped)
            .unwrap_or(0)
    }

    /// Clears all buckets and counters (used by the coordinated reset).
    pub fn reset(&self) {
        self.buckets.lock().clear();
    }
}

/// Outcome of the rate-limit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Dropped { total_dropped: u64 },
}
