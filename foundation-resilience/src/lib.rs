//! # Resilience Primitives
//!
//! Retry policies and executors, a three-state circuit breaker, and
//! fallback chains. All three are plain objects, shared across concurrent
//! callers by design, composable with each other through ordinary function
//! composition, and usable in both synchronous and async code via explicit
//! `*_sync` / `*_async` entry points.
//!
//! ## Usage
//!
//! ```rust
//! use foundation_resilience::{BackoffStrategy, RetryExecutor, RetryPolicy};
//! use foundation_errors::FoundationError;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3)
//!     .with_backoff(BackoffStrategy::Exponential)
//!     .with_base_delay(Duration::from_millis(10));
//!
//! let executor = RetryExecutor::new(policy);
//! let mut calls = 0;
//! let result: Result<&str, FoundationError> = executor.execute_sync("fetch", || {
//!     calls += 1;
//!     if calls < 2 {
//!         Err(FoundationError::internal("transient"))
//!     } else {
//!         Ok("ok")
//!     }
//! });
//! assert_eq!(result.unwrap(), "ok");
//! ```

pub mod circuit;
pub mod fallback;
pub mod retry;

pub use circuit::{
    reset_all_circuit_breakers, BreakerCallError, CircuitBreaker, CircuitBreakerBuilder,
    CircuitState,
};
pub use fallback::{AsyncFallbackChain, FallbackChain};
pub use retry::{BackoffStrategy, RetryExecutor, RetryPolicy, RetryableError};
