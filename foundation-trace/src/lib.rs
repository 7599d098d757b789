//! # Lightweight Tracer
//!
//! Span creation and propagation without an external backend.
//!
//! ## Overview
//!
//! A [`Span`] is a unit of work with identity (`trace_id`/`span_id`),
//! parentage, timing, tags, and status. The active span lives in
//! task-local storage: async tasks and worker threads each see only their
//! own span, and spawning a task without explicit propagation does not
//! inherit the parent. Logging reads the active span to stamp
//! `trace_id`/`span_id` onto every event.
//!
//! ## Usage
//!
//! Synchronous code scopes a span with a guard:
//!
//! ```rust
//! use foundation_trace::{Span, current_trace_id};
//!
//! let span = Span::new("handle_request");
//! {
//!     let _guard = span.enter();
//!     assert!(current_trace_id().is_some());
//!     // Children created here inherit trace_id and parent_id.
//! }
//! // Guard drop finished the span and restored the previous active span.
//! ```
//!
//! Async code uses `in_scope`, which establishes a task-local context so
//! the span follows the future across worker threads:
//!
//! ```rust
//! use foundation_trace::Span;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let result = Span::new("fetch").in_scope(async {
//!     // current_span() resolves to "fetch" here, even after awaits.
//!     42
//! }).await;
//! assert_eq!(result, 42);
//! # }
//! ```

mod context;
mod span;
mod tracer;

pub use context::{current_span, current_span_ids, current_trace_id, trace_context};
pub use span::{Span, SpanEvent, SpanGuard, SpanSnapshot, SpanStatus};
pub use tracer::{configure_sampling, sampling_rate, Tracer};
