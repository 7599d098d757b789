//! Span lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::context::{self, ParentContext};
use crate::tracer;

/// Span status at finish time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A timestamped event recorded on a span.
#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub attrs: BTreeMap<String, Value>,
}

pub(crate) struct SpanShared {
    pub(crate) span_id: String,
    pub(crate) trace_id: String,
    pub(crate) parent_id: Option<String>,
    pub(crate) name: String,
    pub(crate) sampled: bool,
    start_wall: DateTime<Utc>,
    start_monotonic: Instant,
    mutable: Mutex<SpanMut>,
}

struct SpanMut {
    tags: BTreeMap<String, Value>,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    finished_after: Option<std::time::Duration>,
}

/// A unit of work. Created active; immutable once finished.
///
/// Spans are cheaply cloneable handles; the task-local active pointer holds
/// only a weak reference, so a span becomes unreachable as soon as its
/// owner drops the last handle.
#[derive(Clone)]
pub struct Span {
    pub(crate) shared: Arc<SpanShared>,
}

impl Span {
    /// Creates a span, inheriting `trace_id` and parentage from the active
    /// span in the current task (or thread) context. Without a parent a new
    /// trace is started and the sampling decision is taken.
    pub fn new(name: impl Into<String>) -> Self {
        let parent = context::parent_context();
        Self::with_parent(name, parent)
    }

    pub(crate) fn with_parent(name: impl Into<String>, parent: Option<ParentContext>) -> Self {
        let (trace_id, parent_id, sampled) = match parent {
            Some(parent) => (parent.trace_id, Some(parent.span_id), parent.sampled),
            None => (new_trace_id(), None, tracer::sample_new_trace()),
        };
        Self {
            shared: Arc::new(SpanShared {
                span_id: new_span_id(),
                trace_id,
                parent_id,
                name: name.into(),
                sampled,
                start_wall: Utc::now(),
                start_monotonic: Instant::now(),
                mutable: Mutex::new(SpanMut {
                    tags: BTreeMap::new(),
                    events: Vec::new(),
                    status: SpanStatus::Ok,
                    finished_after: None,
                }),
            }),
        }
    }

    pub fn span_id(&self) -> &str {
        &self.shared.span_id
    }

    pub fn trace_id(&self) -> &str {
        &self.shared.trace_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.shared.parent_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether this trace was kept by the sampler. IDs are generated either
    /// way so log correlation still works.
    pub fn is_sampled(&self) -> bool {
        self.shared.sampled
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.shared.start_wall
    }

    /// Sets a tag. Ignored once the span is finished.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = self.shared.mutable.lock();
        if state.finished_after.is_none() {
            state.tags.insert(key.into(), value.into());
        }
    }

    /// Records a timestamped event. Ignored once the span is finished.
    pub fn add_event(&self, name: impl Into<String>, attrs: BTreeMap<String, Value>) {
        let mut state = self.shared.mutable.lock();
        if state.finished_after.is_none() {
            state.events.push(SpanEvent {
                timestamp: Utc::now(),
                name: name.into(),
                attrs,
            });
        }
    }

    /// Marks the span failed. Ignored once finished.
    pub fn set_error(&self, message: impl Into<String>) {
        let message: String = message.into();
        let mut state = self.shared.mutable.lock();
        if state.finished_after.is_none() {
            state.status = SpanStatus::Error;
            state
                .tags
                .insert("error.message".to_string(), Value::String(message));
        }
    }

    /// Finishes the span. The second and later calls are no-ops.
    pub fn finish(&self) {
        let mut state = self.shared.mutable.lock();
        if state.finished_after.is_none() {
            state.finished_after = Some(self.shared.start_monotonic.elapsed());
        }
    }

    /// Finishes with an error status (no-op if already finished).
    pub fn finish_with_error(&self, message: impl Into<String>) {
        let message: String = message.into();
        {
            let mut state = self.shared.mutable.lock();
            if state.finished_after.is_none() {
                state.status = SpanStatus::Error;
                state
                    .tags
                    .insert("error.message".to_string(), Value::String(message));
            }
        }
        self.finish();
    }

    pub fn is_finished(&self) -> bool {
        self.shared.mutable.lock().finished_after.is_some()
    }

    pub fn status(&self) -> SpanStatus {
        self.shared.mutable.lock().status
    }

    /// Monotonic duration in milliseconds, or `-1` while unfinished.
    pub fn duration_ms(&self) -> i64 {
        match self.shared.mutable.lock().finished_after {
            Some(elapsed) => elapsed.as_millis() as i64,
            None => -1,
        }
    }

    /// An immutable copy of the span's current state.
    pub fn snapshot(&self) -> SpanSnapshot {
        let state = self.shared.mutable.lock();
        SpanSnapshot {
            span_id: self.shared.span_id.clone(),
            trace_id: self.shared.trace_id.clone(),
            parent_id: self.shared.parent_id.clone(),
            name: self.shared.name.clone(),
            sampled: self.shared.sampled,
            start_time: self.shared.start_wall,
            tags: state.tags.clone(),
            events: state.events.clone(),
            status: state.status,
            duration_ms: state
                .finished_after
                .map(|d| d.as_millis() as i64)
                .unwrap_or(-1),
        }
    }

    /// Makes this span active on the current task (or thread) and returns a
    /// guard. Dropping the guard finishes the span and restores the
    /// previous active span; a drop during unwind records an error status.
    ///
    /// For async code prefer [`Span::in_scope`], which keeps the context
    /// attached to the task across `.await` points.
    pub fn enter(&self) -> SpanGuard {
        context::push(self);
        SpanGuard { span: self.clone() }
    }

    /// Runs a future with this span active in task-local storage, finishing
    /// the span when the future completes. Cancellation (dropping the
    /// future) still finishes the span, with an error status.
    pub async fn in_scope<F>(self, fut: F) -> F::Output
    where
        F: std::future::Future,
    {
        context::in_task_scope(self, fut).await
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Span")
            .field("name", &self.shared.name)
            .field("trace_id", &self.shared.trace_id)
            .field("span_id", &self.shared.span_id)
            .field("parent_id", &self.shared.parent_id)
            .field("sampled", &self.shared.sampled)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Frozen view of a span, suitable for export or assertions.
#[derive(Debug, Clone)]
pub struct SpanSnapshot {
    pub span_id: String,
    pub trace_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub sampled: bool,
    pub start_time: DateTime<Utc>,
    pub tags: BTreeMap<String, Value>,
    pub events: Vec<SpanEvent>,
    pub status: SpanStatus,
    pub duration_ms: i64,
}

/// Keeps a span active for a lexical scope.
pub struct SpanGuard {
    span: Span,
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        context::pop(&self.span);
        if std::thread::panicking() {
            self.span.finish_with_error("panic during span");
        } else {
            self.span.finish();
        }
    }
}

/// 128-bit trace id as 32 lowercase hex chars (UUIDv4, crypto RNG).
fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 64-bit span id as 16 lowercase hex chars.
fn new_span_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
