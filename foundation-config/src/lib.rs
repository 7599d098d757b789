//! # Configuration Core
//!
//! Declarative loading of typed configuration from environment variables and
//! files, with per-field source tracking.
//!
//! ## Overview
//!
//! A configuration type declares its fields as [`FieldSpec`] metadata: env
//! variable, default, converter, validator, sensitivity. Loaders turn that
//! metadata into an immutable [`ConfigSnapshot`] whose per-field
//! [`ConfigSource`] records where each value came from
//! (`DEFAULT < FILE < ENV < RUNTIME`). The [`SchemaConfig`] trait ties a
//! plain struct to its schema so `MyConfig::from_env()` just works.
//!
//! Values prefixed `file://` are secret indirections: the loader reads the
//! referenced file and uses its trimmed content. In
//! [`SchemaConfig::from_env_async`] all secret reads run in parallel and
//! complete before the call returns. Indirection resolves exactly one level;
//! a secret file whose content is itself a `file://` URI is taken literally.
//!
//! ## Usage
//!
//! ```rust
//! use foundation_config::{convert, FieldSpec, SchemaConfig, ConfigSnapshot};
//! use foundation_errors::Result;
//!
//! #[derive(Debug, Clone)]
//! struct ServerConfig {
//!     port: u16,
//!     debug: bool,
//! }
//!
//! impl SchemaConfig for ServerConfig {
//!     fn schema() -> Vec<FieldSpec> {
//!         vec![
//!             FieldSpec::new("port")
//!                 .env_var("APP_PORT")
//!                 .default(serde_json::json!(8000))
//!                 .converter(convert::integer())
//!                 .min_value(1.0)
//!                 .max_value(65535.0),
//!             FieldSpec::new("debug")
//!                 .env_var("APP_DEBUG")
//!                 .default(serde_json::json!(false))
//!                 .converter(convert::boolean()),
//!         ]
//!     }
//!
//!     fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self> {
//!         Ok(Self {
//!             port: snapshot.u64_value("port")? as u16,
//!             debug: snapshot.bool_value("debug")?,
//!         })
//!     }
//! }
//!
//! let config = ServerConfig::from_env().unwrap();
//! assert_eq!(config.port, 8000);
//! ```

pub mod convert;
pub mod env;
pub mod field;
pub mod file;
pub mod loader;
pub mod manager;
pub mod snapshot;
pub mod source;

pub use env::{load_async, load_sync};
pub use field::{Converter, FieldSpec, Validator};
pub use file::load_config_file;
pub use loader::{ChainedLoader, ConfigLoader, DictLoader, EnvLoader, FileLoader, MultiSourceLoader};
pub use manager::{ChangeCallback, ConfigManager};
pub use snapshot::{ConfigMap, ConfigSnapshot};
pub use source::ConfigSource;

use foundation_errors::Result;

/// Ties a typed configuration struct to its declarative field schema.
pub trait SchemaConfig: Sized {
    /// The field metadata driving loading and validation.
    fn schema() -> Vec<FieldSpec>;

    /// Builds the typed struct from a loaded snapshot.
    fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self>;

    /// Loads from the environment (defaults, then env vars). Secret
    /// indirections are resolved with blocking reads.
    fn from_env() -> Result<Self> {
        Self::from_snapshot(&env::load_sync(&Self::schema())?)
    }

    /// Async variant of [`SchemaConfig::from_env`]; all `file://` secret
    /// reads execute in parallel before this returns.
    fn from_env_async() -> impl std::future::Future<Output = Result<Self>> + Send
    where
        Self: Send,
    {
        async {
            let snapshot = env::load_async(&Self::schema()).await?;
            Self::from_snapshot(&snapshot)
        }
    }
}
