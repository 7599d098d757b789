//! Runtime configuration management.
//!
//! A [`ConfigManager`] holds named configurations, each with an optional
//! schema, loader, and defaults. Reads hand out immutable `Arc` snapshots
//! without holding a lock; every mutation builds a new snapshot under the
//! manager lock and notifies subscribers with
//! `(old_snapshot, new_snapshot, changed_fields)` after the lock is
//! released.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use foundation_errors::{FoundationError, Result};

use crate::env;
use crate::field::FieldSpec;
use crate::loader::ConfigLoader;
use crate::snapshot::{ConfigMap, ConfigSnapshot};
use crate::source::ConfigSource;

/// Invoked after a configuration changes.
pub type ChangeCallback =
    Arc<dyn Fn(&ConfigSnapshot, &ConfigSnapshot, &BTreeSet<String>) + Send + Sync>;

struct ManagedConfig {
    schema: Option<Vec<FieldSpec>>,
    defaults: ConfigMap,
    loader: Option<Arc<dyn ConfigLoader>>,
    snapshot: Arc<ConfigSnapshot>,
    callbacks: Vec<ChangeCallback>,
}

impl ManagedConfig {
    fn default_snapshot(&self) -> ConfigSnapshot {
        let mut snapshot = match &self.schema {
            Some(schema) => env::apply_defaults(schema),
            None => ConfigSnapshot::default(),
        };
        for (field, value) in &self.defaults {
            snapshot.set(field, value.clone(), ConfigSource::Default);
        }
        snapshot
    }

    fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.schema
            .as_ref()
            .and_then(|schema| schema.iter().find(|f| f.name == name))
    }
}

/// Holds configurations by name and serializes their mutations.
#[derive(Default)]
pub struct ConfigManager {
    configs: Mutex<HashMap<String, ManagedConfig>>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts registering a named configuration.
    pub fn register(&self, name: impl Into<String>) -> ConfigRegistration<'_> {
        ConfigRegistration {
            manager: self,
            name: name.into(),
            schema: None,
            defaults: ConfigMap::new(),
            loader: None,
        }
    }

    /// The current snapshot; safe to read without any lock held.
    pub fn get(&self, name: &str) -> Option<Arc<ConfigSnapshot>> {
        self.configs
            .lock()
            .get(name)
            .map(|config| Arc::clone(&config.snapshot))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.lock().contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn remove(&self, name: &str) {
        self.configs.lock().remove(name);
    }

    /// Sets a single field at RUNTIME precedence.
    pub fn set(&self, name: &str, field: &str, value: Value) -> Result<()> {
        self.update(
            name,
            ConfigMap::from([(field.to_string(), value)]),
            ConfigSource::Runtime,
        )
    }

    /// Applies a batch of field updates with the given source tag.
    pub fn update(&self, name: &str, updates: ConfigMap, source: ConfigSource) -> Result<()> {
        let (old, new, changed, callbacks) = {
            let mut configs = self.configs.lock();
            let config = configs
                .get_mut(name)
                .ok_or_else(|| unknown_config(name))?;

            let old = Arc::clone(&config.snapshot);
            let mut next = (*old).clone();
            let mut changed = BTreeSet::new();
            for (field, value) in updates {
                let value = match config.field_spec(&field) {
                    Some(spec) => {
                        let typed = match &value {
                            Value::String(text) if spec.converter.is_some() => spec.convert(text)?,
                            other => other.clone(),
                        };
                        spec.check(&typed)?;
                        typed
                    }
                    None => value,
                };
                if next.get(&field) != Some(&value) {
                    changed.insert(field.clone());
                }
                next.set(&field, value, source);
            }
            let new = Arc::new(next);
            config.snapshot = Arc::clone(&new);
            (old, new, changed, config.callbacks.clone())
        };

        if !changed.is_empty() {
            for callback in callbacks {
                callback(&old, &new, &changed);
            }
        }
        Ok(())
    }

    /// Loads (or reloads) a configuration through its registered loader.
    pub async fn load(&self, name: &str) -> Result<()> {
        let (schema, loader) = {
            let configs = self.configs.lock();
            let config = configs.get(name).ok_or_else(|| unknown_config(name))?;
            let loader = config.loader.clone().ok_or_else(|| {
                FoundationError::configuration(format!(
                    "configuration '{name}' has no loader registered"
                ))
            })?;
            (config.schema.clone(), loader)
        };

        // I/O happens outside the manager lock. Defaults are already present
        // in the snapshot; only loader-provided fields are applied.
        let loaded = loader.load(schema.as_deref().unwrap_or(&[])).await?;
        self.update(name, loaded.values, loader.source())
    }

    /// Alias for [`ConfigManager::load`]; kept for hot-reload hooks.
    pub async fn reload(&self, name: &str) -> Result<()> {
        self.load(name).await
    }

    /// Restores a configuration to its declared defaults.
    pub fn reset(&self, name: &str) -> Result<()> {
        let (old, new, changed, callbacks) = {
            let mut configs = self.configs.lock();
            let config = configs
                .get_mut(name)
                .ok_or_else(|| unknown_config(name))?;
            let old = Arc::clone(&config.snapshot);
            let new = Arc::new(config.default_snapshot());
            let changed: BTreeSet<String> = old
                .field_names()
                .chain(new.field_names())
                .filter(|field| old.get(field) != new.get(field))
                .map(str::to_string)
                .collect();
            config.snapshot = Arc::clone(&new);
            (old, new, changed, config.callbacks.clone())
        };
        if !changed.is_empty() {
            for callback in callbacks {
                callback(&old, &new, &changed);
            }
        }
        Ok(())
    }

    /// Exports the current values; sensitive fields are masked unless
    /// requested.
    pub fn export(&self, name: &str, include_sensitive: bool) -> Result<ConfigMap> {
        let snapshot = self.get(name).ok_or_else(|| unknown_config(name))?;
        Ok(snapshot.export(include_sensitive))
    }

    /// Subscribes to change notifications for a configuration.
    pub fn subscribe(&self, name: &str, callback: ChangeCallback) -> Result<()> {
        let mut configs = self.configs.lock();
        let config = configs
            .get_mut(name)
            .ok_or_else(|| unknown_config(name))?;
        config.callbacks.push(callback);
        Ok(())
    }
}

fn unknown_config(name: &str) -> FoundationError {
    FoundationError::not_found(format!("no configuration named '{name}'"))
        .with_context("config", name)
}

/// Builder returned by [`ConfigManager::register`].
#[must_use = "call apply() to commit the registration"]
pub struct ConfigRegistration<'m> {
    manager: &'m ConfigManager,
    name: String,
    schema: Option<Vec<FieldSpec>>,
    defaults: ConfigMap,
    loader: Option<Arc<dyn ConfigLoader>>,
}

impl ConfigRegistration<'_> {
    pub fn schema(mut self, schema: Vec<FieldSpec>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn defaults(mut self, defaults: ConfigMap) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn loader(mut self, loader: Arc<dyn ConfigLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn apply(self) -> Result<()> {
        let mut configs = self.manager.configs.lock();
        if configs.contains_key(&self.name) {
            return Err(FoundationError::already_exists(format!(
                "configuration '{}' is already registered",
                self.name
            ))
            .with_context("config", &self.name));
        }
        let mut managed = ManagedConfig {
            schema: self.schema,
            defaults: self.defaults,
            loader: self.loader,
            snapshot: Arc::new(ConfigSnapshot::default()),
            callbacks: Vec::new(),
        };
        managed.snapshot = Arc::new(managed.default_snapshot());
        configs.insert(self.name, managed);
        Ok(())
    }
}
