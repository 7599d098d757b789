//! Composable configuration sources.
//!
//! A [`ConfigLoader`] produces the raw values one source can provide for a
//! schema. [`MultiSourceLoader`] merges an ordered list of sources
//! field-by-field: later sources override earlier ones, and the winning
//! [`ConfigSource`] tag is recorded per field. [`ChainedLoader`] instead
//! returns the first source that loads successfully (fallback pattern).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use foundation_errors::{FoundationError, Result};

use crate::env;
use crate::field::FieldSpec;
use crate::file::{parse_config_str, FileFormat};
use crate::snapshot::{ConfigMap, ConfigSnapshot};
use crate::source::ConfigSource;

/// What one source provided, plus any non-fatal notes.
#[derive(Debug, Default, Clone)]
pub struct LoadedValues {
    pub values: ConfigMap,
    pub warnings: Vec<String>,
}

/// One configuration source (file, environment, literal map).
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// Loads whatever this source provides for the schema. Values may be raw
    /// strings; the merging loader applies converters and validators.
    async fn load(&self, schema: &[FieldSpec]) -> Result<LoadedValues>;

    /// The precedence tag recorded for fields this source wins.
    fn source(&self) -> ConfigSource;

    /// Identifier used in error context (path, `env`, ...).
    fn loader_id(&self) -> String;
}

/// Loads from a configuration file (format auto-detected by extension).
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigLoader for FileLoader {
    async fn load(&self, _schema: &[FieldSpec]) -> Result<LoadedValues> {
        let format = FileFormat::detect(&self.path)?;
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            FoundationError::configuration(format!("cannot read {}: {e}", self.path.display()))
                .with_context("path", self.path.display().to_string())
                .with_cause(e)
        })?;
        let values = parse_config_str(&content, format)
            .map_err(|e| e.with_context("path", self.path.display().to_string()))?;
        Ok(LoadedValues {
            values,
            warnings: Vec::new(),
        })
    }

    fn source(&self) -> ConfigSource {
        ConfigSource::File
    }

    fn loader_id(&self) -> String {
        self.path.display().to_string()
    }
}

/// Loads from the process environment (including `file://` secrets).
#[derive(Default)]
pub struct EnvLoader;

impl EnvLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConfigLoader for EnvLoader {
    async fn load(&self, schema: &[FieldSpec]) -> Result<LoadedValues> {
        let snapshot = env::load_async(schema).await?;
        // Only the fields the environment actually provided; defaults are
        // the merging loader's responsibility.
        let values = snapshot
            .values()
            .iter()
            .filter(|(name, _)| snapshot.get_source(name) == Some(ConfigSource::Env))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(LoadedValues {
            values,
            warnings: snapshot.warnings().to_vec(),
        })
    }

    fn source(&self) -> ConfigSource {
        ConfigSource::Env
    }

    fn loader_id(&self) -> String {
        "env".to_string()
    }
}

/// Loads from an in-memory map (used for runtime overrides and tests).
pub struct DictLoader {
    values: ConfigMap,
    source: ConfigSource,
}

impl DictLoader {
    pub fn new(values: ConfigMap) -> Self {
        Self {
            values,
            source: ConfigSource::Runtime,
        }
    }

    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.source = source;
        self
    }
}

#[async_trait]
impl ConfigLoader for DictLoader {
    async fn load(&self, _schema: &[FieldSpec]) -> Result<LoadedValues> {
        Ok(LoadedValues {
            values: self.values.clone(),
            warnings: Vec::new(),
        })
    }

    fn source(&self) -> ConfigSource {
        self.source
    }

    fn loader_id(&self) -> String {
        "dict".to_string()
    }
}

/// Merges an ordered list of sources. Later sources override earlier ones
/// field-by-field; per-field source tracking records the winner.
pub struct MultiSourceLoader {
    loaders: Vec<Arc<dyn ConfigLoader>>,
}

impl MultiSourceLoader {
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ConfigLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub async fn load(&self, schema: &[FieldSpec]) -> Result<ConfigSnapshot> {
        let mut snapshot = env::apply_defaults(schema);
        for loader in &self.loaders {
            let loaded = loader.load(schema).await?;
            for warning in loaded.warnings {
                snapshot.push_warning(warning);
            }
            merge_values(schema, &loaded.values, loader.source(), &mut snapshot)?;
        }
        env::check_required(schema, &snapshot)?;
        Ok(snapshot)
    }
}

impl Default for MultiSourceLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Tries each source in order and builds the snapshot from the first that
/// loads successfully.
pub struct ChainedLoader {
    loaders: Vec<Arc<dyn ConfigLoader>>,
}

impl ChainedLoader {
    pub fn new(loaders: Vec<Arc<dyn ConfigLoader>>) -> Self {
        Self { loaders }
    }

    pub async fn load(&self, schema: &[FieldSpec]) -> Result<ConfigSnapshot> {
        let mut last_error: Option<FoundationError> = None;
        for loader in &self.loaders {
            match loader.load(schema).await {
                Ok(loaded) => {
                    let mut snapshot = env::apply_defaults(schema);
                    for warning in loaded.warnings {
                        snapshot.push_warning(warning);
                    }
                    merge_values(schema, &loaded.values, loader.source(), &mut snapshot)?;
                    env::check_required(schema, &snapshot)?;
                    return Ok(snapshot);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            FoundationError::configuration("chained loader has no sources")
        }))
    }
}

/// Applies one source's values onto the snapshot. Provided keys may be
/// field names or `env_var` names (so `.env` files merge naturally); raw
/// strings go through the field converter, and every installed value passes
/// the field's constraint checks. Keys matching no schema field are ignored.
fn merge_values(
    schema: &[FieldSpec],
    provided: &ConfigMap,
    source: ConfigSource,
    snapshot: &mut ConfigSnapshot,
) -> Result<()> {
    for field in schema {
        let raw = provided.get(&field.name).or_else(|| {
            field
                .env_var
                .as_deref()
                .and_then(|var| provided.get(var))
        });
        let Some(raw) = raw else { continue };

        let value = match raw {
            Value::String(text) if field.converter.is_some() => field.convert(text)?,
            other => other.clone(),
        };
        field.check(&value)?;
        snapshot.set(&field.name, value, source);
    }
    Ok(())
}
