//! Fallback chains.
//!
//! An ordered list of alternative callables: the first slot to return
//! without failing wins, later slots are never invoked, and a total
//! failure surfaces every cause in order on one
//! `ALL_FALLBACKS_FAILED` error.

use std::future::Future;
use std::pin::Pin;

use foundation_errors::{ErrorKind, FoundationError, Result};
use foundation_logging::{get_logger, Logger};

type SyncSlot<T> = Box<dyn Fn() -> anyhow::Result<T> + Send + Sync>;
type AsyncSlot<T> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>> + Send + Sync>;

fn all_failed(attempted: usize, causes: Vec<anyhow::Error>) -> FoundationError {
    let mut error = FoundationError::new(
        ErrorKind::AllFallbacksFailed,
        format!("all {attempted} fallbacks failed"),
    )
    .with_context("attempted", attempted.to_string());
    for cause in causes {
        error = error.with_cause(cause);
    }
    error
}

/// A chain of synchronous alternatives.
pub struct FallbackChain<T> {
    slots: Vec<(String, SyncSlot<T>)>,
    logger: Logger,
}

impl<T> Default for FallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FallbackChain<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            logger: get_logger("foundation.fallback"),
        }
    }

    /// Appends a named slot. Names appear in logs and error context.
    pub fn with_fallback<F, E>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
        E: Into<anyhow::Error>,
    {
        self.slots
            .push((name.into(), Box::new(move || f().map_err(Into::into))));
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Invokes slots in order; the first success wins. Individual failures
    /// are swallowed (logged at WARNING) until every slot has failed.
    pub fn execute(&self) -> Result<T> {
        let mut causes = Vec::new();
        for (name, slot) in &self.slots {
            match slot() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    self.logger.warning(
                        "fallback_slot_failed",
                        &[
                            ("slot", name.clone().into()),
                            ("error_message", error.to_string().into()),
                        ],
                    );
                    causes.push(error);
                }
            }
        }
        Err(all_failed(self.slots.len(), causes))
    }
}

/// A chain of async alternatives. Slots may suspend; the chain itself only
/// awaits between invocations.
pub struct AsyncFallbackChain<T> {
    slots: Vec<(String, AsyncSlot<T>)>,
    logger: Logger,
}

impl<T> Default for AsyncFallbackChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncFallbackChain<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            logger: get_logger("foundation.fallback"),
        }
    }

    pub fn with_fallback<F, Fut, E>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        self.slots.push((
            name.into(),
            Box::new(move || {
                let fut = f();
                Box::pin(async move { fut.await.map_err(Into::into) })
            }),
        ));
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub async fn execute(&self) -> Result<T> {
        let mut causes = Vec::new();
        for (name, slot) in &self.slots {
            match slot().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    self.logger.warning(
                        "fallback_slot_failed",
                        &[
                            ("slot", name.clone().into()),
                            ("error_message", error.to_string().into()),
                        ],
                    );
                    causes.push(error);
                }
            }
        }
        Err(all_failed(self.slots.len(), causes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct SlotError(&'static str);

    #[test]
    fn test_first_success_wins() {
        let chain = FallbackChain::new()
            .with_fallback("primary", || Ok::<_, SlotError>(1));
        assert_eq!(chain.execute().unwrap(), 1);
    }

    #[test]
    fn test_second_slot_wins_third_unreached() {
        let third_calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&third_calls);

        let chain = FallbackChain::new()
            .with_fallback("primary", || Err::<u32, _>(SlotError("down")))
            .with_fallback("secondary", || Ok::<_, SlotError>(42))
            .with_fallback("tertiary", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SlotError>(0)
            });

        assert_eq!(chain.execute().unwrap(), 42);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_total_failure_collects_causes_in_order() {
        let chain = FallbackChain::<u32>::new()
            .with_fallback("a", || Err::<u32, _>(SlotError("first failure")))
            .with_fallback("b", || Err::<u32, _>(SlotError("second failure")));

        let err = chain.execute().unwrap_err();
        assert_eq!(err.code(), "ALL_FALLBACKS_FAILED");
        let messages: Vec<String> = err.causes().iter().map(|c| c.to_string()).collect();
        assert_eq!(messages, vec!["first failure", "second failure"]);
        assert_eq!(err.context().get("attempted").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_chain_composes_with_foundation_errors() {
        let chain = FallbackChain::<&str>::new()
            .with_fallback("strict", || {
                Err::<&str, _>(foundation_errors::FoundationError::validation("nope"))
            })
            .with_fallback("lenient", || Ok::<_, SlotError>("fine"));
        assert_eq!(chain.execute().unwrap(), "fine");
    }

    #[tokio::test]
    async fn test_async_chain() {
        let chain = AsyncFallbackChain::new()
            .with_fallback("remote", || async { Err::<u32, _>(SlotError("timeout")) })
            .with_fallback("cache", || async { Ok::<_, SlotError>(7) });
        assert_eq!(chain.execute().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_async_total_failure() {
        let chain = AsyncFallbackChain::<u32>::new()
            .with_fallback("only", || async { Err::<u32, _>(SlotError("dead")) });
        let err = chain.execute().await.unwrap_err();
        assert_eq!(err.code(), "ALL_FALLBACKS_FAILED");
        assert_eq!(err.causes().len(), 1);
    }

    #[test]
    fn test_empty_chain_fails() {
        let chain = FallbackChain::<u32>::new();
        let err = chain.execute().unwrap_err();
        assert_eq!(err.code(), "ALL_FALLBACKS_FAILED");
        assert!(err.causes().is_empty());
    }
}
