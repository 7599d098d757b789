//! Event-set enrichment.
//!
//! An event set is data only: a named bundle of field-mapping rules
//! `(field, value-pattern) → enrichment`, where an enrichment contributes an
//! emoji prefix, a human label, and extra key/value pairs. The canonical
//! schema is:
//!
//! ```text
//! EventSet     { name, mappings: [FieldMapping] }
//! FieldMapping { field, rules: [(value-pattern, Enrichment)], default? }
//! Enrichment   { emoji?, label?, extra_fields: {key: value} }
//! ```
//!
//! Matching is exact first, then the `*` wildcard, then the mapping's
//! default. Sets apply in registration order; when two sets map the same
//! field, the later-registered set's mapping wins. Emoji prefixes
//! concatenate in match order, labels join with a separator, and extra
//! fields are added only when the event does not already carry the key.
//!
//! The process-wide [`EventSetCoordinator`] lazily indexes the enabled sets
//! and caches the result; [`EventSetCoordinator::reset`] clears the cache.
//! During a coordinated teardown the in-reset flag makes every processor
//! skip enrichment so logs emitted mid-reset cannot re-trigger
//! initialization.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::record::LogRecord;

/// Visual and textual markers contributed by one matched rule.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub emoji: Option<String>,
    pub label: Option<String>,
    pub extra_fields: BTreeMap<String, Value>,
}

impl Enrichment {
    pub fn new(emoji: &str, label: &str) -> Self {
        Self {
            emoji: Some(emoji.to_string()),
            label: Some(label.to_string()),
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_fields.insert(key.into(), value);
        self
    }
}

/// Rules for one event field.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub field: String,
    /// `(value-pattern, enrichment)` pairs; `"*"` matches any value.
    pub rules: Vec<(String, Enrichment)>,
    pub default: Option<Enrichment>,
}

impl FieldMapping {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rules: Vec::new(),
            default: None,
        }
    }

    pub fn rule(mut self, pattern: impl Into<String>, enrichment: Enrichment) -> Self {
        self.rules.push((pattern.into(), enrichment));
        self
    }

    pub fn default_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.default = Some(enrichment);
        self
    }

    fn resolve(&self, value: &Value) -> Option<&Enrichment> {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.rules
            .iter()
            .find(|(pattern, _)| pattern == &text)
            .or_else(|| self.rules.iter().find(|(pattern, _)| pattern == "*"))
            .map(|(_, enrichment)| enrichment)
            .or(self.default.as_ref())
    }
}

/// A named, data-only bundle of field mappings.
#[derive(Debug, Clone)]
pub struct EventSet {
    pub name: String,
    pub mappings: Vec<FieldMapping>,
}

// ---------------------------------------------------------------------------
// Built-in catalog
// ---------------------------------------------------------------------------

fn http_set() -> EventSet {
    EventSet {
        name: "http".to_string(),
        mappings: vec![
            FieldMapping::new("http.method")
                .rule("GET", Enrichment::new("📥", "get"))
                .rule("POST", Enrichment::new("📤", "post"))
                .rule("PUT", Enrichment::new("✏️", "put"))
                .rule("DELETE", Enrichment::new("🗑️", "delete"))
                .rule("*", Enrichment::new("🌐", "http")),
            FieldMapping::new("http.status_class")
                .rule("2xx", Enrichment::new("✅", "success"))
                .rule("4xx", Enrichment::new("⚠️", "client_error"))
                .rule("5xx", Enrichment::new("🔥", "server_error")),
        ],
    }
}

fn database_set() -> EventSet {
    EventSet {
        name: "database".to_string(),
        mappings: vec![FieldMapping::new("db.operation")
            .rule("query", Enrichment::new("🔍", "query"))
            .rule("insert", Enrichment::new("➕", "insert"))
            .rule("update", Enrichment::new("🔄", "update"))
            .rule("delete", Enrichment::new("🗑️", "delete"))
            .rule("*", Enrichment::new("🗄️", "db"))],
    }
}

fn task_set() -> EventSet {
    EventSet {
        name: "task".to_string(),
        mappings: vec![FieldMapping::new("task.status")
            .rule("started", Enrichment::new("▶️", "started"))
            .rule("completed", Enrichment::new("✅", "completed"))
            .rule("failed", Enrichment::new("❌", "failed"))
            .rule("retrying", Enrichment::new("🔁", "retrying"))],
    }
}

fn builtin_sets() -> Vec<EventSet> {
    vec![http_set(), database_set(), task_set()]
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

static IN_RESET: AtomicBool = AtomicBool::new(false);

/// Marks the process as mid-reset; processors skip enrichment while set.
pub fn set_in_reset(value: bool) {
    IN_RESET.store(value, Ordering::SeqCst);
}

pub fn is_in_reset() -> bool {
    IN_RESET.load(Ordering::SeqCst)
}

// Field order preserved from first appearance; later sets replace content.
struct Index {
    order: Vec<String>,
    by_field: HashMap<String, FieldMapping>,
}

/// Loads enabled event sets and applies enrichment to log records.
pub struct EventSetCoordinator {
    custom: Mutex<Vec<EventSet>>,
    enabled: Mutex<Vec<String>>,
    index: RwLock<Option<Arc<Index>>>,
}

impl EventSetCoordinator {
    fn new() -> Self {
        Self {
            custom: Mutex::new(Vec::new()),
            enabled: Mutex::new(Vec::new()),
            index: RwLock::new(None),
        }
    }

    /// Records the enabled set names (from configuration) and invalidates
    /// the cached index. Called when the logging pipeline (re)builds.
    pub fn initialize(&self, enabled: &[String]) {
        *self.enabled.lock() = enabled.to_vec();
        *self.index.write() = None;
    }

    /// Registers an additional set. Later registrations override earlier
    /// ones on field-key collision. The set still must be listed in the
    /// enabled names to take effect.
    pub fn register_set(&self, set: EventSet) {
        self.custom.lock().push(set);
        *self.index.write() = None;
    }

    /// Clears the cached index and enabled names; the next use
    /// re-initializes from configuration.
    pub fn reset(&self) {
        self.enabled.lock().clear();
        *self.index.write() = None;
    }

    fn index(&self) -> Arc<Index> {
        if let Some(index) = self.index.read().as_ref() {
            return Arc::clone(index);
        }
        let mut write = self.index.write();
        if let Some(index) = write.as_ref() {
            return Arc::clone(index);
        }
        let enabled = self.enabled.lock().clone();
        let mut order = Vec::new();
        let mut by_field: HashMap<String, FieldMapping> = HashMap::new();
        let custom = self.custom.lock().clone();
        for set in builtin_sets().into_iter().chain(custom) {
            if !enabled.iter().any(|name| name == &set.name) {
                continue;
            }
            for mapping in set.mappings {
                if !by_field.contains_key(&mapping.field) {
                    order.push(mapping.field.clone());
                }
                by_field.insert(mapping.field.clone(), mapping);
            }
        }
        let index = Arc::new(Index { order, by_field });
        *write = Some(Arc::clone(&index));
        index
    }

    /// Applies enrichment to a record. The pipeline skips this stage
    /// entirely while the in-reset flag is set.
    pub fn apply(&self, record: &mut LogRecord) {
        let index = self.index();
        let mut extras: Vec<(String, Value)> = Vec::new();
        for field in &index.order {
            let Some(value) = record.fields.get(field) else {
                continue;
            };
            let Some(enrichment) = index.by_field[field].resolve(value) else {
                continue;
            };
            if let Some(emoji) = &enrichment.emoji {
                record.emoji.push(emoji.clone());
            }
            if let Some(label) = &enrichment.label {
                record.labels.push(label.clone());
            }
            for (key, value) in &enrichment.extra_fields {
                if !record.fields.contains_key(key) {
                    extras.push((key.clone(), value.clone()));
                }
            }
        }
        for (key, value) in extras {
            record.fields.insert(key, value);
        }
    }
}

/// The process-wide coordinator.
pub fn coordinator() -> &'static EventSetCoordinator {
    static COORDINATOR: OnceLock<EventSetCoordinator> = OnceLock::new();
    COORDINATOR.get_or_init(EventSetCoordinator::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use serde_json::json;

    fn record_with(fields: &[(&str, Value)]) -> LogRecord {
        LogRecord::new("app", Level::Info, "request_done").with_fields(fields)
    }

    fn fresh() -> EventSetCoordinator {
        let coordinator = EventSetCoordinator::new();
        coordinator.initialize(&["http".to_string(), "database".to_string()]);
        coordinator
    }

    #[test]
    fn test_exact_match_wins_over_wildcard() {
        let coordinator = fresh();
        let mut record = record_with(&[("http.method", json!("GET"))]);
        coordinator.apply(&mut record);
        assert_eq!(record.emoji, vec!["📥"]);
        assert_eq!(record.labels, vec!["get"]);
    }

    #[test]
    fn test_wildcard_catches_unknown_values() {
        let coordinator = fresh();
        let mut record = record_with(&[("http.method", json!("PATCH"))]);
        coordinator.apply(&mut record);
        assert_eq!(record.emoji, vec!["🌐"]);
    }

    #[test]
    fn test_multiple_matches_concatenate_in_order() {
        let coordinator = fresh();
        let mut record = record_with(&[
            ("http.method", json!("GET")),
            ("http.status_class", json!("5xx")),
            ("db.operation", json!("query")),
        ]);
        coordinator.apply(&mut record);
        assert_eq!(record.emoji, vec!["📥", "🔥", "🔍"]);
        assert_eq!(record.labels, vec!["get", "server_error", "query"]);
    }

    #[test]
    fn test_disabled_set_does_not_apply() {
        let coordinator = EventSetCoordinator::new();
        coordinator.initialize(&["http".to_string()]);
        let mut record = record_with(&[("db.operation", json!("query"))]);
        coordinator.apply(&mut record);
        assert!(record.emoji.is_empty());
    }

    #[test]
    fn test_extra_fields_do_not_clobber() {
        let coordinator = EventSetCoordinator::new();
        coordinator.register_set(EventSet {
            name: "custom".to_string(),
            mappings: vec![FieldMapping::new("outcome").rule(
                "ok",
                Enrichment::new("✅", "ok")
                    .with_field("outcome.final", json!(true))
                    .with_field("outcome", json!("overwritten")),
            )],
        });
        coordinator.initialize(&["custom".to_string()]);

        let mut record = record_with(&[("outcome", json!("ok"))]);
        coordinator.apply(&mut record);
        // New key added; existing key untouched.
        assert_eq!(record.fields["outcome.final"], json!(true));
        assert_eq!(record.fields["outcome"], json!("ok"));
    }

    #[test]
    fn test_later_set_overrides_field_mapping() {
        let coordinator = EventSetCoordinator::new();
        coordinator.register_set(EventSet {
            name: "override".to_string(),
            mappings: vec![FieldMapping::new("http.method")
                .rule("GET", Enrichment::new("🚀", "turbo_get"))],
        });
        coordinator.initialize(&["http".to_string(), "override".to_string()]);

        let mut record = record_with(&[("http.method", json!("GET"))]);
        coordinator.apply(&mut record);
        assert_eq!(record.emoji, vec!["🚀"]);
    }

    #[test]
    fn test_reset_clears_enabled_sets() {
        let coordinator = fresh();
        coordinator.reset();
        let mut record = record_with(&[("http.method", json!("GET"))]);
        coordinator.apply(&mut record);
        assert!(record.emoji.is_empty());
    }
}
