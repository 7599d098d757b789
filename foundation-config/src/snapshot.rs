//! Immutable configuration snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use foundation_errors::{FoundationError, Result};

use crate::source::ConfigSource;

/// Loaded field values keyed by field name.
pub type ConfigMap = BTreeMap<String, Value>;

/// The observable state of a loaded configuration.
///
/// Snapshots are immutable; runtime updates produce a new snapshot. Reads
/// never take a lock: holders share snapshots behind `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    values: ConfigMap,
    sources: BTreeMap<String, ConfigSource>,
    sensitive: BTreeSet<String>,
    warnings: Vec<String>,
}

impl ConfigSnapshot {
    pub fn new(values: ConfigMap, sources: BTreeMap<String, ConfigSource>) -> Self {
        Self {
            values,
            sources,
            sensitive: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn mark_sensitive(&mut self, field: impl Into<String>) {
        self.sensitive.insert(field.into());
    }

    pub(crate) fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub(crate) fn set(&mut self, field: impl Into<String>, value: Value, source: ConfigSource) {
        let field = field.into();
        self.values.insert(field.clone(), value);
        self.sources.insert(field, source);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// The winning source for a field, if the field was loaded.
    pub fn get_source(&self, field: &str) -> Option<ConfigSource> {
        self.sources.get(field).copied()
    }

    pub fn is_sensitive(&self, field: &str) -> bool {
        self.sensitive.contains(field)
    }

    pub fn values(&self) -> &ConfigMap {
        &self.values
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Non-fatal notes collected during loading (e.g. a secret file falling
    /// back to the field default). The hub emits these once the logger is up.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// An exportable value map. Sensitive fields are masked unless
    /// `include_sensitive` is set; messages built from exports therefore
    /// never leak secrets by default.
    pub fn export(&self, include_sensitive: bool) -> ConfigMap {
        self.values
            .iter()
            .map(|(name, value)| {
                if !include_sensitive && self.sensitive.contains(name) {
                    (name.clone(), Value::String("***".to_string()))
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Typed accessors used by SchemaConfig::from_snapshot implementations.
    // ------------------------------------------------------------------

    pub fn str_value(&self, field: &str) -> Result<&str> {
        self.get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| missing(field, "string"))
    }

    pub fn bool_value(&self, field: &str) -> Result<bool> {
        self.get(field)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing(field, "bool"))
    }

    pub fn u64_value(&self, field: &str) -> Result<u64> {
        self.get(field)
            .and_then(Value::as_u64)
            .ok_or_else(|| missing(field, "unsigned integer"))
    }

    pub fn f64_value(&self, field: &str) -> Result<f64> {
        self.get(field)
            .and_then(Value::as_f64)
            .ok_or_else(|| missing(field, "float"))
    }

    pub fn str_list(&self, field: &str) -> Result<Vec<String>> {
        let items = self
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| missing(field, "list"))?;
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    pub fn object_value(&self, field: &str) -> Result<&serde_json::Map<String, Value>> {
        self.get(field)
            .and_then(Value::as_object)
            .ok_or_else(|| missing(field, "object"))
    }
}

fn missing(field: &str, expected: &str) -> FoundationError {
    FoundationError::configuration(format!("field '{field}' is missing or not a {expected}"))
        .with_context("field", field)
}
