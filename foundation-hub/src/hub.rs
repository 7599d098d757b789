//! The Hub: process-wide composition root.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use foundation_config::{ConfigManager, SchemaConfig};
use foundation_errors::{FoundationError, Result};
use foundation_logging::{get_logger, init_logging, LoggingConfig, TelemetryConfig};
use foundation_registry::{
    Registry, RegistryValue, COMMAND_DIMENSION, COMPONENT_DIMENSION, SINGLETON_DIMENSION,
};

use crate::commands::{CommandHandler, CommandInfo, RegisteredCommand};
use crate::components::{Component, ComponentInfo};

type Factory = Arc<dyn Fn(&Hub) -> Result<RegistryValue> + Send + Sync>;

// Boxed so the registry can store it as an opaque Any value.
struct ComponentHandle(Arc<dyn Component>);

#[derive(Default)]
struct FoundationInit {
    done: bool,
    in_progress: bool,
}

/// Central composition root: owns the primary registries, the composed
/// configuration, and the foundation lifecycle.
///
/// The process singleton comes from [`get_hub`]; tests construct isolated
/// hubs with [`Hub::new`].
pub struct Hub {
    registry: Registry,
    config_manager: ConfigManager,
    factories: Mutex<HashMap<TypeId, Factory>>,
    init: ReentrantMutex<RefCell<FoundationInit>>,
    telemetry: RwLock<Option<TelemetryConfig>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide hub, created lazily on first access.
pub fn get_hub() -> &'static Hub {
    static HUB: OnceLock<Hub> = OnceLock::new();
    HUB.get_or_init(Hub::new)
}

impl Hub {
    /// An isolated hub (no shared state with the process singleton).
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            config_manager: ConfigManager::new(),
            factories: Mutex::new(HashMap::new()),
            init: ReentrantMutex::new(RefCell::new(FoundationInit::default())),
            telemetry: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    /// The telemetry configuration captured by `initialize_foundation`.
    pub fn telemetry_config(&self) -> Option<TelemetryConfig> {
        self.telemetry.read().clone()
    }

    pub fn is_foundation_initialized(&self) -> bool {
        let guard = self.init.lock();
        let state = guard.borrow();
        state.done
    }

    // ------------------------------------------------------------------
    // Foundation lifecycle
    // ------------------------------------------------------------------

    /// Initializes logging, tracing, and the event-set coordinator exactly
    /// once. Idempotent: a second call with equal configuration is a
    /// no-op. A second call with *different* configuration fails when
    /// `strict` is set, and warns and keeps the original otherwise.
    pub fn initialize_foundation(
        &self,
        logging: Option<LoggingConfig>,
        telemetry: Option<TelemetryConfig>,
        strict: bool,
    ) -> Result<()> {
        let guard = self.init.lock();
        {
            let state = guard.borrow();
            if state.done {
                drop(state);
                return self.handle_reinit(logging, telemetry, strict);
            }
            if state.in_progress {
                // Re-entrant call from inside initialization.
                return Ok(());
            }
        }
        guard.borrow_mut().in_progress = true;

        let result = self.do_initialize(logging, telemetry);
        let mut state = guard.borrow_mut();
        state.in_progress = false;
        if result.is_ok() {
            state.done = true;
        }
        result
    }

    fn do_initialize(
        &self,
        logging: Option<LoggingConfig>,
        telemetry: Option<TelemetryConfig>,
    ) -> Result<()> {
        let mut telemetry = match telemetry {
            Some(config) => config,
            None => TelemetryConfig::from_env()?,
        };
        if let Some(logging) = logging {
            telemetry.logging = logging;
        }

        // Environment-load warnings (e.g. secret fallback) surface once
        // the pipeline is up.
        let snapshot = foundation_config::load_sync(&TelemetryConfig::schema())?;

        init_logging(telemetry.logging.clone())?;
        foundation_trace::configure_sampling(telemetry.trace_sample_rate);

        let log = get_logger("foundation.hub");
        for warning in snapshot.warnings() {
            log.warning("config_load_warning", &[("detail", warning.clone().into())]);
        }

        self.registry
            .register(
                SINGLETON_DIMENSION,
                "telemetry_config",
                Arc::new(telemetry.clone()),
            )
            .replace(true)
            .apply()?;
        *self.telemetry.write() = Some(telemetry);
        Ok(())
    }

    fn handle_reinit(
        &self,
        logging: Option<LoggingConfig>,
        telemetry: Option<TelemetryConfig>,
        strict: bool,
    ) -> Result<()> {
        let current = self.telemetry.read().clone();
        let Some(current) = current else {
            return Ok(());
        };

        let logging_differs = logging
            .as_ref()
            .map(|config| *config != current.logging)
            .unwrap_or(false);
        let telemetry_differs = telemetry
            .as_ref()
            .map(|config| *config != current)
            .unwrap_or(false);

        if !logging_differs && !telemetry_differs {
            return Ok(());
        }
        if strict {
            return Err(FoundationError::already_exists(
                "foundation is already initialized with different configuration",
            ));
        }
        get_logger("foundation.hub").warning(
            "foundation_reinit_ignored",
            &[("reason", "configuration differs from the initialized one".into())],
        );
        Ok(())
    }

    /// Clears the foundation-init flag and captured configuration (used by
    /// the coordinated reset).
    pub(crate) fn reset_foundation_flag(&self) {
        let guard = self.init.lock();
        *guard.borrow_mut() = FoundationInit::default();
        *self.telemetry.write() = None;
        self.factories.lock().clear();
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Registers a component under the `component` dimension.
    pub fn add_component(
        &self,
        name: &str,
        component: Arc<dyn Component>,
    ) -> ComponentRegistration<'_> {
        ComponentRegistration {
            hub: self,
            name: name.to_string(),
            dimension: COMPONENT_DIMENSION.to_string(),
            component,
            metadata: Vec::new(),
            aliases: Vec::new(),
            replace: false,
        }
    }

    pub fn get_component(&self, name: &str, dimension: Option<&str>) -> Result<Option<Arc<dyn Component>>> {
        let dimension = dimension.or(Some(COMPONENT_DIMENSION));
        Ok(self
            .registry
            .get_as::<ComponentHandle>(name, dimension)?
            .map(|handle| Arc::clone(&handle.0)))
    }

    pub fn list_components(&self, dimension: Option<&str>) -> Vec<String> {
        self.registry
            .list_dimension(dimension.unwrap_or(COMPONENT_DIMENSION))
    }

    /// Registers externally discovered components (the explicit stand-in
    /// for entry-point scanning). Each entry is tagged with its group.
    pub fn register_discovered(
        &self,
        group: &str,
        components: Vec<(String, Arc<dyn Component>)>,
    ) -> Result<Vec<ComponentInfo>> {
        let mut registered = Vec::new();
        for (name, component) in components {
            let info = self
                .add_component(&name, component)
                .metadata("entry_point_group", group.into())
                .apply()?;
            registered.push(info);
        }
        Ok(registered)
    }

    /// Runs `initialize` on every registered component, in registration
    /// order.
    pub async fn initialize_components(&self) -> Result<()> {
        for entry in self.registry.entries(COMPONENT_DIMENSION) {
            if let Ok(handle) = entry.value.clone().downcast::<ComponentHandle>() {
                handle.0.initialize().await.map_err(|e| {
                    e.with_context("component", &entry.name)
                })?;
            }
        }
        Ok(())
    }

    /// Runs `cleanup` on every registered component, newest first. All
    /// components are attempted; the first error is reported.
    pub async fn cleanup_components(&self) -> Result<()> {
        let mut first_error = None;
        for entry in self.registry.entries(COMPONENT_DIMENSION).into_iter().rev() {
            if let Ok(handle) = entry.value.clone().downcast::<ComponentHandle>() {
                if let Err(err) = handle.0.cleanup().await {
                    let err = err.with_context("component", &entry.name);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// The context-manager analogue: initialize components, run the body,
    /// clean up (cleanup runs even when the body fails).
    pub async fn scope<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.initialize_components().await?;
        let outcome = body().await;
        let cleanup = self.cleanup_components().await;
        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Registers a command under the `command` dimension.
    pub fn add_command(&self, name: &str, handler: CommandHandler) -> CommandRegistration<'_> {
        CommandRegistration {
            hub: self,
            name: name.to_string(),
            handler,
            description: String::new(),
            aliases: Vec::new(),
            hidden: false,
            category: None,
        }
    }

    pub fn get_command(&self, name: &str) -> Result<Option<RegisteredCommand>> {
        Ok(self
            .registry
            .get_as::<RegisteredCommand>(name, Some(COMMAND_DIMENSION))?
            .map(|command| (*command).clone()))
    }

    pub fn list_commands(&self) -> Vec<CommandInfo> {
        self.registry
            .entries(COMMAND_DIMENSION)
            .into_iter()
            .filter_map(|entry| {
                entry
                    .value
                    .downcast::<RegisteredCommand>()
                    .ok()
                    .map(|command| command.info.clone())
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Dependency resolution
    // ------------------------------------------------------------------

    /// Registers the factory used by [`Hub::resolve`] for `T`. The factory
    /// receives the hub and may resolve its own dependencies through it;
    /// the registry's re-entrant locking makes nested resolution safe.
    pub fn register_factory<T, F>(&self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Hub) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        self.factories.lock().insert(
            TypeId::of::<T>(),
            Arc::new(move |hub: &Hub| factory(hub).map(|value| value as RegistryValue)),
        );
    }

    /// Builds a `T` by running its registered factory (the explicit
    /// registration path statically typed targets use instead of
    /// constructor introspection).
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        // The lock is released before the factory runs so factories can
        // resolve their own dependencies through the hub.
        let factory = self.factories.lock().get(&TypeId::of::<T>()).cloned();
        let Some(factory) = factory else {
            return Err(FoundationError::not_found(format!(
                "no factory registered for type {}",
                std::any::type_name::<T>()
            ))
            .with_context("type", std::any::type_name::<T>()));
        };
        let value = factory(self)?;
        value.downcast::<T>().map_err(|_| {
            FoundationError::integrity(format!(
                "factory for {} produced a different type",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Removes registrations in one dimension, or everything.
    pub fn clear(&self, dimension: Option<&str>) {
        self.registry.clear(dimension);
    }
}

/// Builder returned by [`Hub::add_component`].
#[must_use = "call apply() to commit the registration"]
pub struct ComponentRegistration<'h> {
    hub: &'h Hub,
    name: String,
    dimension: String,
    component: Arc<dyn Component>,
    metadata: Vec<(String, serde_json::Value)>,
    aliases: Vec<String>,
    replace: bool,
}

impl ComponentRegistration<'_> {
    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = dimension.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.push((key.into(), value));
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn apply(self) -> Result<ComponentInfo> {
        let mut registration = self.hub.registry.register(
            &self.dimension,
            &self.name,
            Arc::new(ComponentHandle(self.component)),
        );
        for (key, value) in self.metadata {
            registration = registration.metadata(key, value);
        }
        registration
            .aliases(self.aliases.clone())
            .replace(self.replace)
            .apply()?;
        Ok(ComponentInfo {
            name: self.name,
            dimension: self.dimension,
            aliases: self.aliases,
        })
    }
}

/// Builder returned by [`Hub::add_command`].
#[must_use = "call apply() to commit the registration"]
pub struct CommandRegistration<'h> {
    hub: &'h Hub,
    name: String,
    handler: CommandHandler,
    description: String,
    aliases: Vec<String>,
    hidden: bool,
    category: Option<String>,
}

impl CommandRegistration<'_> {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn apply(self) -> Result<CommandInfo> {
        let info = CommandInfo {
            name: self.name.clone(),
            description: self.description,
            aliases: self.aliases.clone(),
            hidden: self.hidden,
            category: self.category,
        };
        let command = RegisteredCommand {
            info: info.clone(),
            handler: self.handler,
        };
        self.hub
            .registry
            .register(COMMAND_DIMENSION, &self.name, Arc::new(command))
            .metadata("hidden", self.hidden.into())
            .aliases(self.aliases)
            .apply()?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        initialized: AtomicU32,
        cleaned: AtomicU32,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                initialized: AtomicU32::new(0),
                cleaned: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Component for Counter {
        async fn initialize(&self) -> Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleaned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_component_registration_and_lookup() {
        let hub = Hub::new();
        let counter = Counter::new();
        let info = hub
            .add_component("counter", counter)
            .aliases(["ticker"])
            .metadata("version", 1.into())
            .apply()
            .unwrap();

        assert_eq!(info.name, "counter");
        assert!(hub.get_component("counter", None).unwrap().is_some());
        assert!(hub.get_component("ticker", None).unwrap().is_some());
        assert_eq!(hub.list_components(None), vec!["counter"]);
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let hub = Hub::new();
        hub.add_component("dup", Counter::new()).apply().unwrap();
        let err = hub.add_component("dup", Counter::new()).apply().unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_run() {
        let hub = Hub::new();
        let a = Counter::new();
        let b = Counter::new();
        hub.add_component("a", Arc::clone(&a) as Arc<dyn Component>)
            .apply()
            .unwrap();
        hub.add_component("b", Arc::clone(&b) as Arc<dyn Component>)
            .apply()
            .unwrap();

        let result = hub.scope(|| async { Ok::<_, FoundationError>(99) }).await.unwrap();
        assert_eq!(result, 99);
        assert_eq!(a.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(b.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(a.cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(b.cleaned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scope_cleans_up_on_body_failure() {
        let hub = Hub::new();
        let component = Counter::new();
        hub.add_component("c", Arc::clone(&component) as Arc<dyn Component>)
            .apply()
            .unwrap();

        let result: Result<()> = hub
            .scope(|| async { Err(FoundationError::internal("body failed")) })
            .await;
        assert!(result.is_err());
        assert_eq!(component.cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_command_registration() {
        let hub = Hub::new();
        hub.add_command("deploy", Arc::new(|_args| Ok(serde_json::json!("deployed"))))
            .description("Ship it")
            .aliases(["d"])
            .category("release")
            .apply()
            .unwrap();

        let command = hub.get_command("d").unwrap().unwrap();
        assert_eq!(command.info.name, "deploy");
        assert_eq!(command.info.description, "Ship it");
        let output = (command.handler)(&[]).unwrap();
        assert_eq!(output, serde_json::json!("deployed"));

        let listed = hub.list_commands();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].category.as_deref(), Some("release"));
    }

    #[derive(Debug)]
    struct Database {
        url: String,
    }

    struct Service {
        database: Arc<Database>,
    }

    #[test]
    fn test_factory_resolution_with_dependencies() {
        let hub = Hub::new();
        hub.register_factory::<Database, _>(|_hub| {
            Ok(Arc::new(Database {
                url: "sqlite::memory:".to_string(),
            }))
        });
        hub.register_factory::<Service, _>(|hub| {
            Ok(Arc::new(Service {
                database: hub.resolve::<Database>()?,
            }))
        });

        let service = hub.resolve::<Service>().unwrap();
        assert_eq!(service.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_resolve_unregistered_type_fails() {
        let hub = Hub::new();
        let err = hub.resolve::<Database>().unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.context().get("type").unwrap().contains("Database"));
    }

    #[test]
    fn test_clear_scopes_to_dimension() {
        let hub = Hub::new();
        hub.add_component("c", Counter::new()).apply().unwrap();
        hub.add_command("x", Arc::new(|_| Ok(serde_json::Value::Null)))
            .apply()
            .unwrap();

        hub.clear(Some(COMPONENT_DIMENSION));
        assert!(hub.list_components(None).is_empty());
        assert_eq!(hub.list_commands().len(), 1);
    }
}
