//! The processor chain.
//!
//! Each event traverses the stages in declaration order: level gate,
//! timestamp, caller context, rate limit, trace context, event enrichment,
//! exception formatting, rendering, sink. No stage suspends or performs I/O
//! except the final write.

use chrono::{SecondsFormat, Utc};

use crate::config::LoggingConfig;
use crate::event_sets::{self, coordinator};
use crate::format::{self, ConsoleFormatter};
use crate::level::Level;
use crate::ratelimit::{RateDecision, RateLimiterSet};
use crate::record::LogRecord;
use crate::stream;

/// A rate-limit diagnostic is emitted once per this many dropped events.
const DROP_DIAGNOSTIC_EVERY: u64 = 100;

/// An initialized pipeline: configuration plus per-logger rate buckets.
pub struct Pipeline {
    config: LoggingConfig,
    limiter: RateLimiterSet,
    color: bool,
}

impl Pipeline {
    /// Builds the pipeline and initializes the event-set coordinator with
    /// the configured enabled sets.
    pub fn new(config: LoggingConfig) -> Self {
        coordinator().initialize(&config.enabled_event_sets);
        let color = config.resolve_color(stream::stream_is_terminal());
        let limiter = RateLimiterSet::new(
            config
                .rate_limits
                .iter()
                .map(|(name, spec)| (name.clone(), *spec))
                .collect(),
        );
        Self {
            config,
            limiter,
            color,
        }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Runs one record through the chain. Dropped records (level gate or
    /// rate limit) produce no output.
    pub fn process(&self, mut record: LogRecord) {
        // 1. Level gate.
        if record.level < self.config.effective_level(&record.logger) {
            return;
        }

        // 2. Timestamp (ISO-8601 UTC, millisecond precision). 3. Caller
        // context was captured at the call site, if at all.
        record.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        // 4. Rate limit. The level gate ran first so filtered events never
        // consume tokens.
        match self.limiter.check(&record.logger) {
            RateDecision::Allowed => {}
            RateDecision::Dropped { total_dropped } => {
                if total_dropped % DROP_DIAGNOSTIC_EVERY == 0 {
                    let diagnostic =
                        LogRecord::new(record.logger.clone(), Level::Warning, "log_rate_limited")
                            .with_fields(&[
                                ("dropped_total", total_dropped.into()),
                                ("logger_name", record.logger.clone().into()),
                            ]);
                    self.finish(diagnostic);
                }
                return;
            }
        }

        self.finish(record);
    }

    /// Stages after the drop decisions: trace context, enrichment,
    /// rendering, sink.
    fn finish(&self, mut record: LogRecord) {
        if record.timestamp.is_none() {
            record.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        }

        // 5. Trace context from the task-local active span.
        if let Some((trace_id, span_id, _sampled)) = foundation_trace::current_span_ids() {
            record.trace_id = Some(trace_id);
            record.span_id = Some(span_id);
        }

        // 6. Enrichment, skipped during reset and when suppressed.
        if !self.config.suppress_event_enrichment && !event_sets::is_in_reset() {
            coordinator().apply(&mut record);
        }

        // 7. Exception formatting happened when the error was attached.
        // 8. Render.
        let line = if self.config.json_output || self.config.console_formatter == ConsoleFormatter::Json
        {
            format::render_json(&record)
        } else if self.config.console_formatter == ConsoleFormatter::Plain {
            format::render_plain(&record)
        } else {
            format::render_key_value(&record, self.color, self.config.use_emoji)
        };

        // 9. Sink: one atomic line write.
        stream::write_line(&line);
    }

    /// Events dropped by the rate limiter for a logger so far.
    pub fn dropped(&self, logger: &str) -> u64 {
        self.limiter.dropped(logger)
    }

    /// Clears rate-limit buckets (coordinated reset, step 2).
    pub fn reset_rate_limits(&self) {
        self.limiter.reset();
    }
}
