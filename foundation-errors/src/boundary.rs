//! Error-boundary helper.
//!
//! An [`ErrorBoundary`] wraps a fallible region at a subsystem edge: it
//! captures whatever error escapes, populates its context from a caller
//! provided context provider, and either rewraps it as a
//! [`FoundationError`] or hands it to an optional mapper first.
//!
//! Panics are deliberately not caught: a panic is the Rust analogue of the
//! memory errors the taxonomy contract forbids swallowing. Cancellation of
//! an async region is a dropped future and never reaches the boundary.

use std::collections::BTreeMap;
use std::future::Future;

use crate::{ErrorKind, FoundationError, Result};

type ContextProvider = Box<dyn Fn() -> BTreeMap<String, String> + Send + Sync>;
type ErrorMapper = Box<dyn Fn(FoundationError) -> FoundationError + Send + Sync>;

/// Captures errors at a subsystem edge and enriches them with context.
///
/// ```rust
/// use foundation_errors::ErrorBoundary;
///
/// let boundary = ErrorBoundary::new(|| {
///     [("subsystem".to_string(), "ingest".to_string())].into()
/// });
///
/// let err = boundary
///     .run(|| Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
///     .unwrap_err();
/// assert_eq!(err.context().get("subsystem").map(String::as_str), Some("ingest"));
/// ```
pub struct ErrorBoundary {
    context_provider: ContextProvider,
    mapper: Option<ErrorMapper>,
}

impl ErrorBoundary {
    /// Creates a boundary with the given context provider. The provider is
    /// invoked only when an error actually escapes the region.
    pub fn new<C>(context_provider: C) -> Self
    where
        C: Fn() -> BTreeMap<String, String> + Send + Sync + 'static,
    {
        Self {
            context_provider: Box::new(context_provider),
            mapper: None,
        }
    }

    /// Installs a mapper applied to the captured error before it propagates.
    pub fn with_mapper<M>(mut self, mapper: M) -> Self
    where
        M: Fn(FoundationError) -> FoundationError + Send + Sync + 'static,
    {
        self.mapper = Some(Box::new(mapper));
        self
    }

    /// Runs a synchronous region, capturing any escaping error.
    pub fn run<T, E, F>(&self, f: F) -> Result<T>
    where
        E: Into<anyhow::Error>,
        F: FnOnce() -> std::result::Result<T, E>,
    {
        match f() {
            Ok(value) => Ok(value),
            Err(err) => Err(self.capture(err.into())),
        }
    }

    /// Runs an async region, capturing any escaping error. Dropping the
    /// returned future cancels the region without invoking the boundary.
    pub async fn run_async<T, E, Fut>(&self, fut: Fut) -> Result<T>
    where
        E: Into<anyhow::Error>,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.capture(err.into())),
        }
    }

    fn capture(&self, cause: anyhow::Error) -> FoundationError {
        let mut err = match cause.downcast::<FoundationError>() {
            // Already one of ours: keep kind, message, and existing context.
            Ok(inner) => inner,
            Err(other) => FoundationError::new(ErrorKind::Foundation, other.to_string())
                .with_cause(other),
        };
        for (key, value) in (self.context_provider)() {
            err = err.with_context(key, value);
        }
        match &self.mapper {
            Some(mapper) => mapper(err),
            None => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> BTreeMap<String, String> {
        [("origin".to_string(), "test".to_string())].into()
    }

    #[test]
    fn test_success_passes_through_untouched() {
        let boundary = ErrorBoundary::new(ctx);
        let value = boundary.run(|| Ok::<_, std::io::Error>(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_foreign_error_is_wrapped_with_context() {
        let boundary = ErrorBoundary::new(ctx);
        let err = boundary
            .run(|| Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire")))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Foundation);
        assert_eq!(err.context().get("origin").map(String::as_str), Some("test"));
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_foundation_error_keeps_its_kind() {
        let boundary = ErrorBoundary::new(ctx);
        let err = boundary
            .run(|| Err::<(), _>(FoundationError::validation("bad field")))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "bad field");
        assert_eq!(err.context().get("origin").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_mapper_applies_after_context() {
        let boundary = ErrorBoundary::new(ctx)
            .with_mapper(|e| e.with_context("mapped", "yes"));
        let err = boundary
            .run(|| Err::<(), _>(FoundationError::internal("oops")))
            .unwrap_err();

        assert_eq!(err.context().get("mapped").map(String::as_str), Some("yes"));
        assert_eq!(err.context().get("origin").map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn test_async_region_captured() {
        let boundary = ErrorBoundary::new(ctx);
        let err = boundary
            .run_async(async { Err::<(), _>(FoundationError::not_found("nothing here")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
