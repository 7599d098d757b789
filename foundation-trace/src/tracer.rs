//! Tracer entry point and sampling.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::span::Span;

// Process-wide sample rate, stored as f64 bits. 1.0 = keep everything.
static SAMPLE_RATE_BITS: AtomicU64 = AtomicU64::new(0x3FF0_0000_0000_0000);

/// Sets the probability (0.0–1.0) that a *new* trace is sampled. Children
/// inherit their root's decision. Out-of-range values are clamped.
pub fn configure_sampling(rate: f64) {
    let rate = rate.clamp(0.0, 1.0);
    SAMPLE_RATE_BITS.store(rate.to_bits(), Ordering::Relaxed);
}

/// The currently configured sample rate.
pub fn sampling_rate() -> f64 {
    f64::from_bits(SAMPLE_RATE_BITS.load(Ordering::Relaxed))
}

pub(crate) fn sample_new_trace() -> bool {
    let rate = sampling_rate();
    rate >= 1.0 || rand::random::<f64>() < rate
}

/// Creates spans carrying a fixed set of base tags (typically the service
/// name and version from telemetry configuration).
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    base_tags: Vec<(String, serde_json::Value)>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.base_tags.push((key.into(), value.into()));
        self
    }

    /// Starts a span, inheriting the current task's active span as parent.
    pub fn span(&self, name: impl Into<String>) -> Span {
        let span = Span::new(name);
        for (key, value) in &self.base_tags {
            span.set_tag(key.clone(), value.clone());
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The sample rate is process-wide; tests that touch it serialize here.
    static RATE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn test_sampling_rate_clamped() {
        let _lock = RATE_LOCK.lock().unwrap();
        configure_sampling(7.5);
        assert_eq!(sampling_rate(), 1.0);
        configure_sampling(-1.0);
        assert_eq!(sampling_rate(), 0.0);
        configure_sampling(1.0);
    }

    #[test]
    fn test_zero_rate_drops_new_traces_but_keeps_ids() {
        let _lock = RATE_LOCK.lock().unwrap();
        configure_sampling(0.0);
        let span = Span::new("unsampled");
        assert!(!span.is_sampled());
        assert_eq!(span.trace_id().len(), 32);
        configure_sampling(1.0);
    }

    #[test]
    fn test_children_inherit_sampling_decision() {
        let _lock = RATE_LOCK.lock().unwrap();
        configure_sampling(0.0);
        let root = Span::new("root");
        let _guard = root.enter();
        configure_sampling(1.0);
        // The trace was started unsampled; the child must stay unsampled
        // even though the rate changed.
        let child = Span::new("child");
        assert!(!child.is_sampled());
    }

    #[test]
    fn test_tracer_base_tags() {
        let tracer = Tracer::new().with_tag("service.name", "billing");
        let span = tracer.span("request");
        assert_eq!(
            span.snapshot().tags.get("service.name"),
            Some(&serde_json::Value::from("billing"))
        );
    }
}
