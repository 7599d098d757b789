//! Library-provided converters.
//!
//! Each function returns a [`Converter`] ready to hang on a [`FieldSpec`].
//! Converters fail with a validation error naming the expected shape; the
//! offending raw value is echoed only for non-sensitive parse targets
//! (levels, numbers, booleans) where the input cannot be a secret.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use foundation_errors::{FoundationError, Result};

use crate::field::{Converter, FieldSpec};

const LEVELS: [&str; 6] = ["TRACE", "DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Case-insensitive log level parser; yields the canonical uppercase name.
pub fn log_level() -> Converter {
    Arc::new(|raw: &str| {
        let upper = raw.trim().to_ascii_uppercase();
        if LEVELS.contains(&upper.as_str()) {
            Ok(Value::String(upper))
        } else {
            Err(FoundationError::validation(format!(
                "'{raw}' is not a log level (expected one of {})",
                LEVELS.join(", ")
            )))
        }
    })
}

/// Boolean parser recognizing `true/false`, `yes/no`, `on/off`, `1/0`.
pub fn boolean() -> Converter {
    Arc::new(|raw: &str| match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
        "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
        _ => Err(FoundationError::validation(format!(
            "'{raw}' is not a boolean (expected true/false, yes/no, on/off, 1/0)"
        ))),
    })
}

/// Integer parser.
pub fn integer() -> Converter {
    Arc::new(|raw: &str| {
        raw.trim()
            .parse::<i64>()
            .map(|n| json!(n))
            .map_err(|_| FoundationError::validation(format!("'{raw}' is not an integer")))
    })
}

/// Float parser with an inclusive range.
pub fn float_in_range(min: f64, max: f64) -> Converter {
    Arc::new(move |raw: &str| {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| FoundationError::validation(format!("'{raw}' is not a number")))?;
        if value < min || value > max {
            return Err(FoundationError::validation(format!(
                "{value} is outside [{min}, {max}]"
            )));
        }
        Ok(json!(value))
    })
}

/// Comma-separated list parser; trims items and drops empties.
pub fn comma_list() -> Converter {
    Arc::new(|raw: &str| {
        let items: Vec<Value> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect();
        Ok(Value::Array(items))
    })
}

/// Parses `"mod1:DEBUG,mod2:ERROR"` into a module → level object.
pub fn module_levels() -> Converter {
    let parse_level = log_level();
    Arc::new(move |raw: &str| {
        let mut map = Map::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (module, level) = item.split_once(':').ok_or_else(|| {
                FoundationError::validation(format!(
                    "'{item}' is not a module:LEVEL pair"
                ))
            })?;
            map.insert(module.trim().to_string(), parse_level(level)?);
        }
        Ok(Value::Object(map))
    })
}

/// Parses `"logger:rate:capacity,..."` into a logger → {rate, capacity}
/// object. Rate is tokens per second; capacity is the bucket size.
pub fn rate_limits() -> Converter {
    Arc::new(|raw: &str| {
        let mut map = Map::new();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let parts: Vec<&str> = item.split(':').collect();
            let [logger, rate, capacity] = parts.as_slice() else {
                return Err(FoundationError::validation(format!(
                    "'{item}' is not a logger:rate:capacity triple"
                )));
            };
            let rate: f64 = rate.trim().parse().map_err(|_| {
                FoundationError::validation(format!("rate '{rate}' is not a number"))
            })?;
            let capacity: f64 = capacity.trim().parse().map_err(|_| {
                FoundationError::validation(format!("capacity '{capacity}' is not a number"))
            })?;
            if rate <= 0.0 || capacity <= 0.0 {
                return Err(FoundationError::validation(
                    "rate and capacity must be positive",
                ));
            }
            map.insert(
                logger.trim().to_string(),
                json!({ "rate": rate, "capacity": capacity }),
            );
        }
        Ok(Value::Object(map))
    })
}

/// Applies a field's converter to a raw string, tagging errors with the
/// field name and source variable.
pub fn apply(field: &FieldSpec, raw: &str, origin: &str) -> Result<Value> {
    field
        .convert(raw)
        .map_err(|e| e.with_context("origin", origin))
}
