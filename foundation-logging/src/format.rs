//! Output rendering: canonical JSON lines and human key=value lines.

use serde_json::{Map, Value};

use crate::level::Level;
use crate::record::LogRecord;

/// Console output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormatter {
    KeyValue,
    Json,
    Plain,
}

impl ConsoleFormatter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "key_value" => Some(ConsoleFormatter::KeyValue),
            "json" => Some(ConsoleFormatter::Json),
            "plain" => Some(ConsoleFormatter::Plain),
            _ => None,
        }
    }
}

const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

fn level_color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m",    // bright black
        Level::Debug => "\x1b[36m",    // cyan
        Level::Info => "\x1b[32m",     // green
        Level::Warning => "\x1b[33m",  // yellow
        Level::Error => "\x1b[31m",    // red
        Level::Critical => "\x1b[35m", // magenta
    }
}

/// Renders one record as a single JSON object, newline-terminated by the
/// sink. Required keys: `timestamp`, `level`, `event`, `logger`.
pub fn render_json(record: &LogRecord) -> String {
    let mut object = Map::new();
    object.insert(
        "timestamp".to_string(),
        Value::String(record.timestamp.clone().unwrap_or_default()),
    );
    object.insert(
        "level".to_string(),
        Value::String(record.level.as_str().to_string()),
    );
    object.insert("event".to_string(), Value::String(record.event.clone()));
    object.insert("logger".to_string(), Value::String(record.logger.clone()));
    if let Some(trace_id) = &record.trace_id {
        object.insert("trace_id".to_string(), Value::String(trace_id.clone()));
    }
    if let Some(span_id) = &record.span_id {
        object.insert("span_id".to_string(), Value::String(span_id.clone()));
    }
    if let Some(site) = &record.site {
        object.insert("module".to_string(), Value::String(site.module.to_string()));
        object.insert("file".to_string(), Value::String(site.file.to_string()));
        object.insert("line".to_string(), Value::from(site.line));
    }
    if let Some(exception) = &record.exception {
        object.insert("exception".to_string(), exception.clone());
    }
    for (key, value) in &record.fields {
        object.entry(key.clone()).or_insert_with(|| value.clone());
    }
    // A Map<String, Value> always serializes.
    serde_json::to_string(&Value::Object(object)).unwrap_or_else(|_| String::from("{}"))
}

/// Renders `<timestamp> <LEVEL> [<emoji>] <event> k=v ...`, quoting values
/// containing whitespace or `=` with standard backslash escapes.
pub fn render_key_value(record: &LogRecord, use_color: bool, use_emoji: bool) -> String {
    let mut line = String::new();

    if let Some(timestamp) = &record.timestamp {
        if use_color {
            line.push_str(DIM);
            line.push_str(timestamp);
            line.push_str(RESET);
        } else {
            line.push_str(timestamp);
        }
        line.push(' ');
    }

    if use_color {
        line.push_str(level_color(record.level));
        line.push_str(record.level.as_str());
        line.push_str(RESET);
    } else {
        line.push_str(record.level.as_str());
    }
    line.push(' ');

    if use_emoji && !record.emoji.is_empty() {
        line.push('[');
        line.push_str(&record.emoji.join(""));
        line.push_str("] ");
    }

    line.push_str(&record.event);

    if !record.labels.is_empty() {
        line.push_str(" <");
        line.push_str(&record.labels.join("|"));
        line.push('>');
    }

    line.push_str(" logger=");
    line.push_str(&quote_if_needed(&record.logger));

    if let Some(trace_id) = &record.trace_id {
        line.push_str(" trace_id=");
        line.push_str(trace_id);
    }
    if let Some(span_id) = &record.span_id {
        line.push_str(" span_id=");
        line.push_str(span_id);
    }
    if let Some(site) = &record.site {
        line.push_str(&format!(" module={} line={}", site.module, site.line));
    }

    for (key, value) in &record.fields {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&format_value(value));
    }

    if let Some(exception) = &record.exception {
        if let Some(message) = exception.get("message").and_then(Value::as_str) {
            line.push_str(" exception=");
            line.push_str(&quote_if_needed(message));
        }
        if let Some(lines) = exception.get("traceback_lines").and_then(Value::as_array) {
            for entry in lines {
                if let Some(text) = entry.as_str() {
                    line.push('\n');
                    line.push_str("    ");
                    line.push_str(text);
                }
            }
        }
    }

    line
}

/// Renders `<timestamp> <LEVEL> <event>` only (the `plain` formatter).
pub fn render_plain(record: &LogRecord) -> String {
    match &record.timestamp {
        Some(timestamp) => format!("{timestamp} {} {}", record.level.as_str(), record.event),
        None => format!("{} {}", record.level.as_str(), record.event),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(text) => quote_if_needed(text),
        other => other.to_string(),
    }
}

fn quote_if_needed(text: &str) -> String {
    let needs_quoting =
        text.is_empty() || text.chars().any(|c| c.is_whitespace() || c == '=' || c == '"');
    if !needs_quoting {
        return text.to_string();
    }
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}
