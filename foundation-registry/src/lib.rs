//! # Multi-Dimensional Registry
//!
//! A thread-safe `(dimension, name) → value` store with aliases, metadata,
//! and insertion-order iteration. The hub owns three instances of this type
//! (component, command, singleton); applications may create their own for
//! other dimensions.
//!
//! ## Overview
//!
//! - Values are opaque (`Arc<dyn Any + Send + Sync>`); typed access goes
//!   through [`Registry::get_as`].
//! - Aliases register additional lookup keys pointing at the same entry and
//!   may not collide with primary names in the same dimension.
//! - All operations run under a single re-entrant mutex, so callbacks that
//!   re-enter the registry on the same thread (a component constructor
//!   resolving other components during registration) do not deadlock.
//! - Iteration is a snapshot taken at call time: each primary entry appears
//!   exactly once, in insertion order, and concurrent mutation after the
//!   snapshot is invisible to the iterator.
//!
//! ## Usage
//!
//! ```rust
//! use foundation_registry::{Registry, COMPONENT_DIMENSION};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry
//!     .register(COMPONENT_DIMENSION, "cache", Arc::new(42_u32))
//!     .metadata("version", "1".into())
//!     .aliases(["memcache"])
//!     .apply()
//!     .unwrap();
//!
//! let value = registry.get_as::<u32>("memcache", Some(COMPONENT_DIMENSION)).unwrap();
//! assert_eq!(*value.unwrap(), 42);
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;

use foundation_errors::{FoundationError, Result};

/// Dimension holding user-registered components.
pub const COMPONENT_DIMENSION: &str = "component";
/// Dimension holding CLI command metadata.
pub const COMMAND_DIMENSION: &str = "command";
/// Dimension holding process-wide singletons.
pub const SINGLETON_DIMENSION: &str = "singleton";

/// An opaque registered value.
pub type RegistryValue = Arc<dyn Any + Send + Sync>;

/// A registered entry: value plus bookkeeping.
#[derive(Clone)]
pub struct RegistryEntry {
    pub dimension: String,
    pub name: String,
    pub value: RegistryValue,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub aliases: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("dimension", &self.dimension)
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("metadata", &self.metadata)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

#[derive(Default)]
struct DimensionStore {
    // Primary names in insertion order.
    order: Vec<String>,
    entries: HashMap<String, RegistryEntry>,
    // alias -> primary name
    aliases: HashMap<String, String>,
}

impl DimensionStore {
    fn resolve<'a>(&'a self, name: &str) -> Option<&'a RegistryEntry> {
        if let Some(entry) = self.entries.get(name) {
            return Some(entry);
        }
        self.aliases
            .get(name)
            .and_then(|primary| self.entries.get(primary))
    }

    fn has_key(&self, name: &str) -> bool {
        self.entries.contains_key(name) || self.aliases.contains_key(name)
    }
}

#[derive(Default)]
struct RegistryState {
    dimensions: HashMap<String, DimensionStore>,
}

/// The multi-dimensional store.
#[derive(Default)]
pub struct Registry {
    state: ReentrantMutex<RefCell<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a registration. Call [`Registration::apply`] to commit.
    ///
    /// Registration is atomic: every uniqueness check runs before any
    /// mutation, so a failed call leaves the registry unchanged.
    pub fn register<'r>(
        &'r self,
        dimension: &str,
        name: &str,
        value: RegistryValue,
    ) -> Registration<'r> {
        Registration {
            registry: self,
            dimension: dimension.to_string(),
            name: name.to_string(),
            value,
            metadata: BTreeMap::new(),
            aliases: Vec::new(),
            replace: false,
        }
    }

    fn commit(&self, reg: &Registration<'_>) -> Result<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        let store = state.dimensions.entry(reg.dimension.clone()).or_default();

        if !reg.replace {
            if store.has_key(&reg.name) {
                return Err(FoundationError::already_exists(format!(
                    "'{}' is already registered",
                    reg.name
                ))
                .with_context("dimension", &reg.dimension)
                .with_context("name", &reg.name));
            }
            for alias in &reg.aliases {
                if store.has_key(alias) {
                    return Err(FoundationError::already_exists(format!(
                        "alias '{alias}' is already registered"
                    ))
                    .with_context("dimension", &reg.dimension)
                    .with_context("alias", alias));
                }
            }
        } else {
            // Even with replace, an alias may not shadow another primary name.
            for alias in &reg.aliases {
                if alias != &reg.name && store.entries.contains_key(alias) {
                    return Err(FoundationError::already_exists(format!(
                        "alias '{alias}' collides with a primary name"
                    ))
                    .with_context("dimension", &reg.dimension)
                    .with_context("alias", alias));
                }
            }
        }

        // Checks passed; mutate. Replacing drops the old entry's aliases.
        if let Some(old) = store.entries.remove(&reg.name) {
            for alias in &old.aliases {
                store.aliases.remove(alias);
            }
        } else {
            store.order.push(reg.name.clone());
        }

        let entry = RegistryEntry {
            dimension: reg.dimension.clone(),
            name: reg.name.clone(),
            value: Arc::clone(&reg.value),
            metadata: reg.metadata.clone(),
            aliases: reg.aliases.clone(),
            registered_at: Utc::now(),
        };
        for alias in &reg.aliases {
            store.aliases.insert(alias.clone(), reg.name.clone());
        }
        store.entries.insert(reg.name.clone(), entry);
        Ok(())
    }

    /// Looks up a value by name (or alias).
    ///
    /// With a dimension, the search is confined to it. Without one, all
    /// dimensions are searched; a name present in more than one dimension is
    /// an [`AmbiguousLookup`](foundation_errors::ErrorKind::AmbiguousLookup)
    /// error.
    pub fn get(&self, name: &str, dimension: Option<&str>) -> Result<Option<RegistryValue>> {
        Ok(self.get_entry(name, dimension)?.map(|e| e.value))
    }

    /// Typed lookup; returns `Ok(None)` when absent or when the stored value
    /// is of a different type.
    pub fn get_as<T: Any + Send + Sync>(
        &self,
        name: &str,
        dimension: Option<&str>,
    ) -> Result<Option<Arc<T>>> {
        Ok(self
            .get(name, dimension)?
            .and_then(|v| v.downcast::<T>().ok()))
    }

    /// Looks up the full entry (value, metadata, aliases).
    pub fn get_entry(&self, name: &str, dimension: Option<&str>) -> Result<Option<RegistryEntry>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        match dimension {
            Some(dim) => Ok(state
                .dimensions
                .get(dim)
                .and_then(|store| store.resolve(name))
                .cloned()),
            None => {
                let mut hits: Vec<&RegistryEntry> = Vec::new();
                for store in state.dimensions.values() {
                    if let Some(entry) = store.resolve(name) {
                        hits.push(entry);
                    }
                }
                match hits.len() {
                    0 => Ok(None),
                    1 => Ok(Some(hits[0].clone())),
                    n => Err(FoundationError::ambiguous_lookup(format!(
                        "'{name}' is registered in {n} dimensions; pass a dimension"
                    ))
                    .with_context("name", name)),
                }
            }
        }
    }

    /// Primary names in a dimension, in insertion order.
    pub fn list_dimension(&self, dimension: &str) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dimensions
            .get(dimension)
            .map(|store| store.order.clone())
            .unwrap_or_default()
    }

    /// Every dimension with its primary names in insertion order.
    pub fn list_all(&self) -> BTreeMap<String, Vec<String>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dimensions
            .iter()
            .map(|(dim, store)| (dim.clone(), store.order.clone()))
            .collect()
    }

    /// Snapshot of every primary entry in a dimension, insertion order.
    pub fn entries(&self, dimension: &str) -> Vec<RegistryEntry> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dimensions
            .get(dimension)
            .map(|store| {
                store
                    .order
                    .iter()
                    .filter_map(|name| store.entries.get(name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes an entry and its aliases. Idempotent.
    pub fn remove(&self, name: &str, dimension: &str) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(store) = state.dimensions.get_mut(dimension) {
            if let Some(entry) = store.entries.remove(name) {
                for alias in &entry.aliases {
                    store.aliases.remove(alias);
                }
                store.order.retain(|n| n != name);
            }
        }
    }

    /// Removes everything in one dimension, or everything. Idempotent.
    pub fn clear(&self, dimension: Option<&str>) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match dimension {
            Some(dim) => {
                state.dimensions.remove(dim);
            }
            None => state.dimensions.clear(),
        }
    }

    pub fn contains(&self, name: &str, dimension: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dimensions
            .get(dimension)
            .map(|store| store.has_key(name))
            .unwrap_or(false)
    }

    /// Number of primary entries in a dimension (or across all).
    pub fn len(&self, dimension: Option<&str>) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        match dimension {
            Some(dim) => state
                .dimensions
                .get(dim)
                .map(|store| store.order.len())
                .unwrap_or(0),
            None => state.dimensions.values().map(|s| s.order.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len(None) == 0
    }
}

/// Pending registration builder returned by [`Registry::register`].
#[must_use = "call apply() to commit the registration"]
pub struct Registration<'r> {
    registry: &'r Registry,
    dimension: String,
    name: String,
    value: RegistryValue,
    metadata: BTreeMap<String, serde_json::Value>,
    aliases: Vec<String>,
    replace: bool,
}

impl Registration<'_> {
    /// Attaches a metadata key/value pair.
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Adds alias lookup keys for this entry.
    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Allows overwriting an existing entry with the same name.
    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    /// Commits the registration.
    pub fn apply(self) -> Result<()> {
        self.registry.commit(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(n: u32) -> RegistryValue {
        Arc::new(n)
    }

    #[test]
    fn test_register_and_get() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .apply()
            .unwrap();

        let hit = registry
            .get_as::<u32>("cache", Some(COMPONENT_DIMENSION))
            .unwrap();
        assert_eq!(hit.as_deref(), Some(&1));
    }

    #[test]
    fn test_duplicate_name_rejected_without_replace() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .apply()
            .unwrap();

        let err = registry
            .register(COMPONENT_DIMENSION, "cache", value(2))
            .apply()
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");

        // Original untouched.
        let hit = registry
            .get_as::<u32>("cache", Some(COMPONENT_DIMENSION))
            .unwrap();
        assert_eq!(hit.as_deref(), Some(&1));
    }

    #[test]
    fn test_replace_overwrites_value_and_drops_old_aliases() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .aliases(["memcache"])
            .apply()
            .unwrap();

        registry
            .register(COMPONENT_DIMENSION, "cache", value(2))
            .replace(true)
            .apply()
            .unwrap();

        let hit = registry
            .get_as::<u32>("cache", Some(COMPONENT_DIMENSION))
            .unwrap();
        assert_eq!(hit.as_deref(), Some(&2));
        // Alias from the replaced entry is gone.
        assert!(!registry.contains("memcache", COMPONENT_DIMENSION));
        // Still one primary entry.
        assert_eq!(registry.len(Some(COMPONENT_DIMENSION)), 1);
    }

    #[test]
    fn test_alias_resolves_to_entry() {
        let registry = Registry::new();
        registry
            .register(COMMAND_DIMENSION, "deploy", value(1))
            .aliases(["d", "ship"])
            .apply()
            .unwrap();

        let entry = registry
            .get_entry("ship", Some(COMMAND_DIMENSION))
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "deploy");
    }

    #[test]
    fn test_alias_cannot_collide_with_primary() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .apply()
            .unwrap();

        let err = registry
            .register(COMPONENT_DIMENSION, "store", value(2))
            .aliases(["cache"])
            .apply()
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
        // Failed registration left nothing behind.
        assert!(!registry.contains("store", COMPONENT_DIMENSION));
    }

    #[test]
    fn test_cross_dimension_lookup_ambiguity() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "status", value(1))
            .apply()
            .unwrap();
        registry
            .register(COMMAND_DIMENSION, "status", value(2))
            .apply()
            .unwrap();

        let err = registry.get("status", None).unwrap_err();
        assert_eq!(err.code(), "AMBIGUOUS_LOOKUP");

        // Unique names resolve without a dimension.
        registry
            .register(SINGLETON_DIMENSION, "coordinator", value(3))
            .apply()
            .unwrap();
        assert!(registry.get("coordinator", None).unwrap().is_some());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = Registry::new();
        for name in ["alpha", "beta", "gamma"] {
            registry
                .register(COMPONENT_DIMENSION, name, value(0))
                .apply()
                .unwrap();
        }
        assert_eq!(
            registry.list_dimension(COMPONENT_DIMENSION),
            vec!["alpha", "beta", "gamma"]
        );

        registry.remove("beta", COMPONENT_DIMENSION);
        assert_eq!(
            registry.list_dimension(COMPONENT_DIMENSION),
            vec!["alpha", "gamma"]
        );
    }

    #[test]
    fn test_iteration_yields_each_primary_once() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .aliases(["memcache", "mc"])
            .apply()
            .unwrap();
        registry
            .register(COMPONENT_DIMENSION, "store", value(2))
            .apply()
            .unwrap();

        let names: Vec<String> = registry
            .entries(COMPONENT_DIMENSION)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["cache", "store"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = Registry::new();
        registry.remove("ghost", COMPONENT_DIMENSION);
        registry
            .register(COMPONENT_DIMENSION, "cache", value(1))
            .apply()
            .unwrap();
        registry.remove("cache", COMPONENT_DIMENSION);
        registry.remove("cache", COMPONENT_DIMENSION);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent_and_scoped() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "a", value(1))
            .apply()
            .unwrap();
        registry
            .register(COMMAND_DIMENSION, "b", value(2))
            .apply()
            .unwrap();

        registry.clear(Some(COMPONENT_DIMENSION));
        assert_eq!(registry.len(Some(COMPONENT_DIMENSION)), 0);
        assert_eq!(registry.len(Some(COMMAND_DIMENSION)), 1);

        registry.clear(None);
        registry.clear(None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reentrant_lookup_from_same_thread() {
        let registry = Registry::new();
        registry
            .register(COMPONENT_DIMENSION, "inner", value(7))
            .apply()
            .unwrap();

        // Holding the lock (via a lookup guard scope) and looking up again on
        // the same thread must not deadlock.
        let guard = registry.state.lock();
        let nested = registry
            .get_as::<u32>("inner", Some(COMPONENT_DIMENSION))
            .unwrap();
        drop(guard);
        assert_eq!(nested.as_deref(), Some(&7));
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    registry
                        .register(COMPONENT_DIMENSION, &format!("c-{t}-{i}"), value(i))
                        .apply()
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(Some(COMPONENT_DIMENSION)), 8 * 50);
    }
}
