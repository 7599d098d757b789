//! Configuration file parsing.
//!
//! Formats are auto-detected by extension: `.json`, `.yaml`/`.yml`,
//! `.toml`, `.ini`, `.env`. Structured formats are flattened into dotted
//! keys (`server.port`); INI sections flatten the same way; `.env` keys are
//! kept verbatim so they can match field `env_var` names.

use std::path::Path;

use serde_json::{Map, Value};

use foundation_errors::{FoundationError, Result};

use crate::snapshot::ConfigMap;

/// A supported configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
    Toml,
    Ini,
    DotEnv,
}

impl FileFormat {
    /// Detects the format from a path's extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(FileFormat::Json),
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("toml") => Ok(FileFormat::Toml),
            Some("ini") => Ok(FileFormat::Ini),
            Some("env") => Ok(FileFormat::DotEnv),
            _ => Err(FoundationError::configuration(format!(
                "unrecognized configuration file extension: {}",
                path.display()
            ))
            .with_context("path", path.display().to_string())),
        }
    }
}

/// Reads and parses a configuration file, auto-detecting the format.
pub fn load_config_file(path: &Path) -> Result<ConfigMap> {
    let format = FileFormat::detect(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        FoundationError::configuration(format!("cannot read {}: {e}", path.display()))
            .with_context("path", path.display().to_string())
            .with_cause(e)
    })?;
    parse_config_str(&content, format).map_err(|e| e.with_context("path", path.display().to_string()))
}

/// Parses configuration text in the given format.
pub fn parse_config_str(content: &str, format: FileFormat) -> Result<ConfigMap> {
    match format {
        FileFormat::Json => {
            let value: Value = serde_json::from_str(content).map_err(|e| {
                FoundationError::configuration(format!("invalid JSON: {e}"))
                    .with_context("line", e.line().to_string())
                    .with_context("column", e.column().to_string())
            })?;
            Ok(flatten(value))
        }
        FileFormat::Yaml => {
            let value: Value = serde_yaml::from_str(content).map_err(|e| {
                let mut err = FoundationError::configuration(format!("invalid YAML: {e}"));
                if let Some(location) = e.location() {
                    err = err
                        .with_context("line", location.line().to_string())
                        .with_context("column", location.column().to_string());
                }
                err
            })?;
            Ok(flatten(value))
        }
        FileFormat::Toml => {
            let value: toml::Value = toml::from_str(content).map_err(|e| {
                // The toml error message already carries line/column context.
                FoundationError::configuration(format!("invalid TOML: {e}"))
            })?;
            let value = serde_json::to_value(value).map_err(|e| {
                FoundationError::configuration(format!("TOML value not representable: {e}"))
            })?;
            Ok(flatten(value))
        }
        FileFormat::Ini => parse_ini(content),
        FileFormat::DotEnv => parse_dotenv(content),
    }
}

/// Flattens nested objects into dotted keys. Arrays and scalars are kept
/// whole.
fn flatten(value: Value) -> ConfigMap {
    let mut out = ConfigMap::new();
    match value {
        Value::Object(map) => flatten_into(&mut out, String::new(), map),
        other => {
            out.insert(String::new(), other);
        }
    }
    out
}

fn flatten_into(out: &mut ConfigMap, prefix: String, map: Map<String, Value>) {
    for (key, value) in map {
        let full = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_into(out, full, nested),
            scalar => {
                out.insert(full, scalar);
            }
        }
    }
}

/// Section-based INI: `[section]` headers, `key = value` lines, `;` or `#`
/// comments. Keys flatten to `section.key`; values stay strings (schema
/// converters type them later).
fn parse_ini(content: &str) -> Result<ConfigMap> {
    let mut out = ConfigMap::new();
    let mut section = String::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let Some(name) = header.strip_suffix(']') else {
                return Err(ini_error(number, "unterminated section header"));
            };
            section = name.trim().to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ini_error(number, "expected key=value"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ini_error(number, "empty key"));
        }
        let full = if section.is_empty() {
            key.to_string()
        } else {
            format!("{section}.{key}")
        };
        out.insert(full, Value::String(value.trim().to_string()));
    }
    Ok(out)
}

fn ini_error(line_index: usize, message: &str) -> FoundationError {
    FoundationError::configuration(format!("invalid INI: {message}"))
        .with_context("line", (line_index + 1).to_string())
}

/// `.env` format: `KEY=value` one per line, `#` comments, optional single or
/// double quotes around the value, no `export` prefix required.
fn parse_dotenv(content: &str) -> Result<ConfigMap> {
    let mut out = ConfigMap::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(
                FoundationError::configuration("invalid .env line: expected KEY=value")
                    .with_context("line", (number + 1).to_string()),
            );
        };
        let key = key.trim();
        let mut value = value.trim();
        if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
            || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
        {
            value = &value[1..value.len() - 1];
        }
        out.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(out)
}
