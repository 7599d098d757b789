//! # Structured Logging Pipeline
//!
//! A composable processor chain turning `log.<level>(event, fields)` calls
//! into rendered lines on a configurable sink.
//!
//! ## Overview
//!
//! Every event traverses the chain once, in declaration order:
//!
//! 1. **Level gate**: longest-prefix lookup in `module_levels`, falling
//!    back to the default level.
//! 2. **Timestamp**: ISO-8601 UTC with millisecond precision.
//! 3. **Caller context**: module/file/line when captured via
//!    [`call_site!`].
//! 4. **Rate limit**: per-logger token buckets with lazy monotonic refill
//!    and drop counters.
//! 5. **Trace context**: `trace_id`/`span_id` from the task-local active
//!    span.
//! 6. **Event enrichment**: emoji/label/extra-field markers from enabled
//!    event sets (skipped during process reset).
//! 7. **Exception formatting**: structured `type`/`message`/
//!    `traceback_lines` from an error's source chain.
//! 8. **Rendering**: canonical JSON lines, or human `key=value` with
//!    optional color and emoji.
//! 9. **Sink**: one atomic line write to the process log stream (stderr by
//!    default, replaceable for tests via [`set_log_stream`]).
//!
//! Initialization is lazy and happens exactly once across concurrent
//! callers; see [`logger`] for the three-state flag protocol. The pipeline
//! never suspends and performs no I/O other than the final write, so it is
//! safe to call from async tasks and threads alike.
//!
//! ## Usage
//!
//! ```rust
//! use foundation_logging::{get_logger, init_logging, Level, LoggingConfig};
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_default_level(Level::Info)
//!         .with_event_sets(["http"]),
//! ).unwrap();
//!
//! let log = get_logger("app.http");
//! log.info("request_done", &[
//!     ("http.method", "GET".into()),
//!     ("status", 200.into()),
//! ]);
//! ```

pub mod config;
pub mod console;
pub mod event_sets;
pub mod format;
pub mod level;
pub mod logger;
pub mod processors;
pub mod ratelimit;
pub mod record;
pub mod stream;

pub use config::{LoggingConfig, TelemetryConfig};
pub use console::{perr, pout};
pub use event_sets::{
    coordinator, is_in_reset, set_in_reset, Enrichment, EventSet, EventSetCoordinator,
    FieldMapping,
};
pub use format::ConsoleFormatter;
pub use level::Level;
pub use logger::{
    current_pipeline, get_logger, init_error, init_logging, is_initialized, rate_limit_drops,
    reset_logging_state, reset_pipeline, try_init_strict, Logger,
};
pub use ratelimit::RateLimitSpec;
pub use record::{CallSite, LogRecord};
pub use stream::{reset_log_stream, set_log_stream, CaptureStream};
