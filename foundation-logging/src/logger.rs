//! Logger handles and lazy pipeline initialization.
//!
//! The first `log.*` call (or an explicit [`init_logging`] from the hub)
//! builds the pipeline from environment configuration. Initialization is
//! guarded by a re-entrant lock plus a three-state flag
//! `{done, in_progress, error}`:
//!
//! - concurrent first-callers block on the lock and observe `done`;
//! - a log call re-entering from *within* initialization on the same thread
//!   sees `in_progress` and drops its event instead of deadlocking;
//! - on failure the error is recorded, the lock releases, and later callers
//!   retry ([`try_init_strict`] surfaces the error instead).
//!
//! Nothing here runs at module load time: the runtime cell is constructed
//! empty and reads no environment until the first log call.

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value;

use foundation_config::SchemaConfig;
use foundation_errors::{FoundationError, Result};

use crate::config::LoggingConfig;
use crate::level::Level;
use crate::processors::Pipeline;
use crate::record::{CallSite, LogRecord};

#[derive(Default)]
struct InitState {
    done: bool,
    in_progress: bool,
    error: Option<String>,
}

struct LoggingRuntime {
    init: ReentrantMutex<RefCell<InitState>>,
    pipeline: RwLock<Option<Arc<Pipeline>>>,
}

fn runtime() -> &'static LoggingRuntime {
    static RUNTIME: OnceLock<LoggingRuntime> = OnceLock::new();
    RUNTIME.get_or_init(|| LoggingRuntime {
        init: ReentrantMutex::new(RefCell::new(InitState::default())),
        pipeline: RwLock::new(None),
    })
}

/// Explicitly initializes (or re-initializes) the pipeline with the given
/// configuration. The hub calls this from `initialize_foundation`.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let rt = runtime();
    let guard = rt.init.lock();
    let pipeline = Arc::new(Pipeline::new(config));
    *rt.pipeline.write() = Some(pipeline);
    let mut state = guard.borrow_mut();
    state.done = true;
    state.in_progress = false;
    state.error = None;
    Ok(())
}

/// The lazy path: returns the pipeline, initializing from the environment
/// on first use. Returns `None` when initialization is already running on
/// this thread (re-entrant call) or failed: the event is dropped.
fn ensure_initialized() -> Option<Arc<Pipeline>> {
    let rt = runtime();
    if let Some(pipeline) = rt.pipeline.read().as_ref() {
        return Some(Arc::clone(pipeline));
    }

    let guard = rt.init.lock();
    {
        let state = guard.borrow();
        if state.done {
            return rt.pipeline.read().as_ref().map(Arc::clone);
        }
        if state.in_progress {
            return None;
        }
    }
    guard.borrow_mut().in_progress = true;

    let result = LoggingConfig::from_env();
    let mut state = guard.borrow_mut();
    match result {
        Ok(config) => {
            let pipeline = Arc::new(Pipeline::new(config));
            *rt.pipeline.write() = Some(Arc::clone(&pipeline));
            state.done = true;
            state.in_progress = false;
            state.error = None;
            Some(pipeline)
        }
        Err(err) => {
            state.error = Some(err.to_string());
            state.in_progress = false;
            None
        }
    }
}

/// Strict initialization: like the lazy path, but surfaces the failure.
pub fn try_init_strict() -> Result<Arc<Pipeline>> {
    if let Some(pipeline) = ensure_initialized() {
        return Ok(pipeline);
    }
    let rt = runtime();
    let guard = rt.init.lock();
    let state = guard.borrow();
    Err(FoundationError::configuration(format!(
        "logging initialization failed: {}",
        state.error.as_deref().unwrap_or("initialization in progress")
    )))
}

/// The active pipeline, if initialized.
pub fn current_pipeline() -> Option<Arc<Pipeline>> {
    runtime().pipeline.read().as_ref().map(Arc::clone)
}

/// The last recorded initialization error, if any.
pub fn init_error() -> Option<String> {
    let guard = runtime().init.lock();
    let state = guard.borrow();
    state.error.clone()
}

/// Whether lazy initialization has completed.
pub fn is_initialized() -> bool {
    let guard = runtime().init.lock();
    let state = guard.borrow();
    state.done
}

/// Drops the active pipeline (configuration, rate buckets) without
/// touching the lazy-init flag. Coordinated-reset step: the pipeline
/// configuration is torn down before the hub clears its registries, while
/// the init flag is reset only afterwards.
pub fn reset_pipeline() {
    *runtime().pipeline.write() = None;
}

/// Clears the pipeline and the lazy-init flag. Part of the coordinated
/// reset; the next log call re-initializes from the environment.
pub fn reset_logging_state() {
    let rt = runtime();
    let guard = rt.init.lock();
    *rt.pipeline.write() = None;
    let mut state = guard.borrow_mut();
    *state = InitState::default();
}

/// Rate-limit drop count for a logger (0 when uninitialized).
pub fn rate_limit_drops(logger: &str) -> u64 {
    current_pipeline()
        .map(|pipeline| pipeline.dropped(logger))
        .unwrap_or(0)
}

/// A named logger handle. Cheap to create; all handles share the process
/// pipeline.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

/// Returns a logger handle for the given dotted name.
pub fn get_logger(name: impl Into<String>) -> Logger {
    Logger { name: name.into() }
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trace(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Trace, event, fields);
    }

    pub fn debug(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Debug, event, fields);
    }

    pub fn info(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Info, event, fields);
    }

    pub fn warning(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Warning, event, fields);
    }

    pub fn error(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Error, event, fields);
    }

    pub fn critical(&self, event: &str, fields: &[(&str, Value)]) {
        self.log(Level::Critical, event, fields);
    }

    /// `error(..)` with traceback capture from the error's source chain.
    pub fn exception(
        &self,
        event: &str,
        error: &(dyn std::error::Error + 'static),
        fields: &[(&str, Value)],
    ) {
        let Some(pipeline) = ensure_initialized() else {
            return;
        };
        let record = LogRecord::new(&self.name, Level::Error, event)
            .with_fields(fields)
            .with_exception(error);
        pipeline.process(record);
    }

    pub fn log(&self, level: Level, event: &str, fields: &[(&str, Value)]) {
        self.log_at(level, None, event, fields);
    }

    /// Emits with caller context captured via [`call_site!`](crate::call_site).
    pub fn log_at(
        &self,
        level: Level,
        site: Option<CallSite>,
        event: &str,
        fields: &[(&str, Value)],
    ) {
        let Some(pipeline) = ensure_initialized() else {
            return;
        };
        let record = LogRecord::new(&self.name, level, event)
            .with_fields(fields)
            .with_site(site);
        pipeline.process(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{reset_log_stream, test_guard, CaptureStream};
    use serde_json::json;

    fn fresh_capture() -> CaptureStream {
        reset_logging_state();
        let capture = CaptureStream::new();
        capture.install();
        capture
    }

    #[test]
    fn test_lazy_init_on_first_log() {
        let _guard = test_guard();
        let capture = fresh_capture();
        assert!(!is_initialized());

        // Default level is WARNING: info is dropped, warning passes.
        let log = get_logger("lazy_test");
        log.info("dropped", &[]);
        log.warning("kept", &[("k", json!(1))]);

        assert!(is_initialized());
        let lines = capture.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("kept"));

        reset_logging_state();
        reset_log_stream();
    }

    #[test]
    fn test_explicit_init_overrides_env() {
        let _guard = test_guard();
        let capture = fresh_capture();

        init_logging(
            LoggingConfig::default()
                .with_default_level(Level::Trace)
                .with_json_output(true),
        )
        .unwrap();

        get_logger("explicit").debug("visible", &[]);
        let parsed: serde_json::Value =
            serde_json::from_str(&capture.lines()[0]).unwrap();
        assert_eq!(parsed["event"], json!("visible"));
        assert_eq!(parsed["logger"], json!("explicit"));

        reset_logging_state();
        reset_log_stream();
    }

    #[test]
    fn test_concurrent_first_callers_initialize_once() {
        let _guard = test_guard();
        let capture = fresh_capture();
        init_logging(LoggingConfig::default().with_default_level(Level::Trace)).unwrap();

        let mut handles = Vec::new();
        for t in 0..8 {
            handles.push(std::thread::spawn(move || {
                let log = get_logger("concurrent");
                for i in 0..20 {
                    log.info(&format!("event_{t}_{i}"), &[]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // One rendered line per event; none torn.
        let lines = capture.lines();
        assert_eq!(lines.len(), 8 * 20);
        assert!(lines.iter().all(|line| line.contains("event_")));

        reset_logging_state();
        reset_log_stream();
    }

    #[test]
    fn test_reset_allows_reinitialization() {
        let _guard = test_guard();
        let capture = fresh_capture();
        init_logging(LoggingConfig::default().with_default_level(Level::Trace)).unwrap();
        get_logger("r").info("first", &[]);

        reset_logging_state();
        assert!(!is_initialized());
        assert!(current_pipeline().is_none());

        // Lazy re-init from env: default WARNING.
        get_logger("r").info("second_dropped", &[]);
        get_logger("r").error("second_kept", &[]);

        let lines = capture.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("second_kept"));

        reset_logging_state();
        reset_log_stream();
    }

    #[test]
    fn test_exception_logging() {
        let _guard = test_guard();
        let capture = fresh_capture();
        init_logging(
            LoggingConfig::default()
                .with_default_level(Level::Trace)
                .with_json_output(true),
        )
        .unwrap();

        let err = FoundationError::configuration("bad port")
            .with_cause(std::io::Error::new(std::io::ErrorKind::Other, "ENOENT"));
        get_logger("x").exception("config_load_failed", &err, &[]);

        let parsed: serde_json::Value =
            serde_json::from_str(&capture.lines()[0]).unwrap();
        assert_eq!(parsed["level"], json!("ERROR"));
        assert_eq!(parsed["exception"]["type"], json!("CONFIGURATION_ERROR"));

        reset_logging_state();
        reset_log_stream();
    }

    #[test]
    fn test_call_site_attached() {
        let _guard = test_guard();
        let capture = fresh_capture();
        init_logging(
            LoggingConfig::default()
                .with_default_level(Level::Trace)
                .with_json_output(true),
        )
        .unwrap();

        get_logger("site").log_at(Level::Info, Some(crate::call_site!()), "located", &[]);

        let parsed: serde_json::Value =
            serde_json::from_str(&capture.lines()[0]).unwrap();
        assert!(parsed["module"].as_str().unwrap().contains("logger"));
        assert!(parsed["line"].as_u64().unwrap() > 0);

        reset_logging_state();
        reset_log_stream();
    }
}
