//! Declarative field metadata.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use foundation_errors::{FoundationError, Result};

/// Turns a raw string (from env or file) into a typed value.
pub type Converter = Arc<dyn Fn(&str) -> Result<Value> + Send + Sync>;

/// Validates a typed value after conversion.
pub type Validator = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// Metadata describing one configuration field.
///
/// Built with the fluent constructors; constraint checks run in a fixed
/// order: choices, min/max, pattern, then the custom validator.
#[derive(Clone)]
pub struct FieldSpec {
    pub name: String,
    pub env_var: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
    pub converter: Option<Converter>,
    pub validator: Option<Validator>,
    pub sensitive: bool,
    pub description: String,
    pub choices: Option<Vec<Value>>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub pattern: Option<Regex>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("env_var", &self.env_var)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: None,
            default: None,
            required: false,
            converter: None,
            validator: None,
            sensitive: false,
            description: String::new(),
            choices: None,
            min_value: None,
            max_value: None,
            pattern: None,
        }
    }

    pub fn env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the field as required: loading fails when no source provides a
    /// value and there is no default.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn min_value(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn max_value(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    /// Regex the (string) value must match in full.
    pub fn pattern(mut self, pattern: &str) -> Self {
        // An invalid pattern is a programming error in the schema itself.
        self.pattern = Some(Regex::new(pattern).expect("invalid field pattern"));
        self
    }

    /// Applies the converter, or passes the raw string through.
    pub fn convert(&self, raw: &str) -> Result<Value> {
        match &self.converter {
            Some(converter) => converter(raw).map_err(|e| {
                e.with_context("field", &self.name)
            }),
            None => Ok(Value::String(raw.to_string())),
        }
    }

    /// Runs every declared constraint against a typed value.
    pub fn check(&self, value: &Value) -> Result<()> {
        if let Some(choices) = &self.choices {
            if !choices.contains(value) {
                return Err(self.violation(format!(
                    "value is not one of the allowed choices ({} options)",
                    choices.len()
                )));
            }
        }
        if self.min_value.is_some() || self.max_value.is_some() {
            let number = value.as_f64().ok_or_else(|| {
                self.violation("numeric bounds declared but value is not a number".to_string())
            })?;
            if let Some(min) = self.min_value {
                if number < min {
                    return Err(self.violation(format!("value {number} is below minimum {min}")));
                }
            }
            if let Some(max) = self.max_value {
                if number > max {
                    return Err(self.violation(format!("value {number} is above maximum {max}")));
                }
            }
        }
        if let Some(pattern) = &self.pattern {
            let text = value.as_str().ok_or_else(|| {
                self.violation("pattern declared but value is not a string".to_string())
            })?;
            if !pattern.is_match(text) {
                return Err(self.violation(format!("value does not match pattern {pattern}")));
            }
        }
        if let Some(validator) = &self.validator {
            validator(value).map_err(|e| e.with_context("field", &self.name))?;
        }
        Ok(())
    }

    fn violation(&self, message: String) -> FoundationError {
        // The value itself is deliberately absent from the message: the
        // field may be sensitive.
        FoundationError::validation(message).with_context("field", &self.name)
    }
}
