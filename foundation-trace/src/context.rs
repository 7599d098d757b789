//! Task-local active-span storage.
//!
//! Async tasks carry their span stack in a `tokio::task_local!`; plain
//! threads without a task scope fall back to a thread-local stack. Lookups
//! never observe another task's span: a spawned task starts with no scope at
//! all, and thread stacks are per-OS-thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Weak;

use crate::span::{Span, SpanShared};

tokio::task_local! {
    static TASK_SPANS: RefCell<Vec<Weak<SpanShared>>>;
}

thread_local! {
    static THREAD_SPANS: RefCell<Vec<Weak<SpanShared>>> = const { RefCell::new(Vec::new()) };
}

/// Identity inherited by a child span.
pub(crate) struct ParentContext {
    pub(crate) trace_id: String,
    pub(crate) span_id: String,
    pub(crate) sampled: bool,
}

fn with_stack<R>(f: impl FnOnce(&RefCell<Vec<Weak<SpanShared>>>) -> R) -> R {
    // try_with does not invoke the closure when no task scope is set, so
    // `f` survives for the thread-local fallback.
    let mut f = Some(f);
    match TASK_SPANS.try_with(|stack| (f.take().expect("closure consumed once"))(stack)) {
        Ok(result) => result,
        Err(_) => THREAD_SPANS.with(|stack| (f.take().expect("closure consumed once"))(stack)),
    }
}

pub(crate) fn push(span: &Span) {
    let weak = std::sync::Arc::downgrade(&span.shared);
    with_stack(|stack| stack.borrow_mut().push(weak));
}

pub(crate) fn pop(span: &Span) {
    with_stack(|stack| {
        let mut stack = stack.borrow_mut();
        // Guards drop in reverse push order; tolerate a stale top from a
        // leaked guard by searching from the end.
        if let Some(position) = stack
            .iter()
            .rposition(|weak| weak.as_ptr() == std::sync::Arc::as_ptr(&span.shared))
        {
            stack.remove(position);
        }
    });
}

fn top() -> Option<std::sync::Arc<SpanShared>> {
    with_stack(|stack| {
        let mut stack = stack.borrow_mut();
        // Drop dead weak refs (owner released the span) from the top.
        while let Some(weak) = stack.last() {
            match weak.upgrade() {
                Some(shared) => return Some(shared),
                None => {
                    stack.pop();
                }
            }
        }
        None
    })
}

pub(crate) fn parent_context() -> Option<ParentContext> {
    top().map(|shared| ParentContext {
        trace_id: shared.trace_id.clone(),
        span_id: shared.span_id.clone(),
        sampled: shared.sampled,
    })
}

/// Runs `fut` with `span` active in task-local storage. If a task scope
/// already exists the span is pushed onto it; otherwise a fresh scope is
/// created so the context survives thread migration. The span is finished
/// when the future completes, or when the future is dropped mid-flight
/// (recorded as an error).
pub(crate) async fn in_task_scope<F>(span: Span, fut: F) -> F::Output
where
    F: Future,
{
    struct FinishOnDrop {
        span: Span,
        completed: bool,
    }
    impl Drop for FinishOnDrop {
        fn drop(&mut self) {
            pop(&self.span);
            if self.completed {
                self.span.finish();
            } else {
                self.span.finish_with_error("cancelled");
            }
        }
    }

    let already_scoped = TASK_SPANS.try_with(|_| ()).is_ok();
    if already_scoped {
        push(&span);
        let mut finisher = FinishOnDrop {
            span,
            completed: false,
        };
        let output = fut.await;
        finisher.completed = true;
        output
    } else {
        TASK_SPANS
            .scope(RefCell::new(Vec::new()), async move {
                push(&span);
                let mut finisher = FinishOnDrop {
                    span,
                    completed: false,
                };
                let output = fut.await;
                finisher.completed = true;
                output
            })
            .await
    }
}

/// The active span of the current task (or thread), if any.
pub fn current_span() -> Option<Span> {
    top().map(|shared| Span { shared })
}

/// The active trace id, if a span is active.
pub fn current_trace_id() -> Option<String> {
    top().map(|shared| shared.trace_id.clone())
}

/// `(trace_id, span_id, sampled)` of the active span, if any.
pub fn current_span_ids() -> Option<(String, String, bool)> {
    top().map(|shared| {
        (
            shared.trace_id.clone(),
            shared.span_id.clone(),
            shared.sampled,
        )
    })
}

/// Wire-propagation headers for the active span. Empty when no span is
/// active.
pub fn trace_context() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    if let Some(shared) = top() {
        headers.insert("trace-id".to_string(), shared.trace_id.clone());
        headers.insert("span-id".to_string(), shared.span_id.clone());
    }
    headers
}
