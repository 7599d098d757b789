//! The event record flowing through the processor chain.

use serde_json::{Map, Value};

use crate::level::Level;

/// Call-site information, captured by [`call_site!`](crate::call_site).
#[derive(Debug, Clone, Copy)]
pub struct CallSite {
    pub module: &'static str,
    pub file: &'static str,
    pub line: u32,
}

/// Captures the current module/file/line for caller-context logging.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::CallSite {
            module: ::std::module_path!(),
            file: ::std::file!(),
            line: ::std::line!(),
        }
    };
}

/// One structured log event. Processors mutate the record in declaration
/// order; the renderer turns it into a line.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub logger: String,
    pub level: Level,
    pub event: String,
    pub fields: Map<String, Value>,
    /// ISO-8601 UTC, millisecond precision. Set by the timestamp processor.
    pub timestamp: Option<String>,
    pub site: Option<CallSite>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    /// Emoji prefixes contributed by event-set enrichment, in match order.
    pub emoji: Vec<String>,
    /// Human labels contributed by enrichment, joined on render.
    pub labels: Vec<String>,
    /// Structured exception info (`type`, `message`, `traceback_lines`).
    pub exception: Option<Value>,
}

impl LogRecord {
    pub fn new(logger: impl Into<String>, level: Level, event: impl Into<String>) -> Self {
        Self {
            logger: logger.into(),
            level,
            event: event.into(),
            fields: Map::new(),
            timestamp: None,
            site: None,
            trace_id: None,
            span_id: None,
            emoji: Vec::new(),
            labels: Vec::new(),
            exception: None,
        }
    }

    pub fn with_fields(mut self, fields: &[(&str, Value)]) -> Self {
        for (key, value) in fields {
            self.fields.insert((*key).to_string(), value.clone());
        }
        self
    }

    pub fn with_site(mut self, site: Option<CallSite>) -> Self {
        self.site = site;
        self
    }

    /// Attaches a structured view of an error and its source chain.
    pub fn with_exception(mut self, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut traceback_lines = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            traceback_lines.push(Value::String(format!("caused by: {cause}")));
            source = cause.source();
        }
        let error_type = foundation_errors_code(error).unwrap_or("error");
        self.exception = Some(serde_json::json!({
            "type": error_type,
            "message": error.to_string(),
            "traceback_lines": traceback_lines,
        }));
        self
    }
}

fn foundation_errors_code(error: &(dyn std::error::Error + 'static)) -> Option<&'static str> {
    error
        .downcast_ref::<foundation_errors::FoundationError>()
        .map(|e| e.code())
}
