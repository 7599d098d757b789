//! Workspace facade crate.
//!
//! This crate exists so host applications can depend on `provide-foundation`
//! and reach every subsystem without wiring the individual workspace crates
//! (`foundation-hub`, `foundation-logging`, ...) one by one. It re-exports
//! the public surface of each member crate under a stable module layout.
//!
//! ```no_run
//! use provide_foundation::hub::get_hub;
//! use provide_foundation::logging::get_logger;
//!
//! fn main() -> provide_foundation::errors::Result<()> {
//!     get_hub().initialize_foundation(None, None, true)?;
//!     let log = get_logger("app");
//!     log.info("service_started", &[("port", 8080.into())]);
//!     Ok(())
//! }
//! ```

pub use foundation_errors as errors;
pub use foundation_registry as registry;
pub use foundation_config as config;
pub use foundation_logging as logging;
pub use foundation_trace as trace;
pub use foundation_resilience as resilience;
pub use foundation_hub as hub;

/// Commonly used items, importable in one line.
pub mod prelude {
    pub use foundation_errors::{ErrorKind, FoundationError, Result};
    pub use foundation_hub::{get_hub, Hub};
    pub use foundation_logging::{get_logger, Level, Logger, LoggingConfig, TelemetryConfig};
    pub use foundation_resilience::{
        BackoffStrategy, CircuitBreaker, FallbackChain, RetryExecutor, RetryPolicy,
    };
    pub use foundation_trace::{current_span, current_trace_id, trace_context, Span, Tracer};
}
