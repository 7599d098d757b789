//! Environment loading with `file://` secret indirection.

use serde_json::Value;

use foundation_errors::{FoundationError, Result};

use crate::field::FieldSpec;
use crate::snapshot::ConfigSnapshot;
use crate::source::ConfigSource;

const SECRET_PREFIX: &str = "file://";

/// Loads a schema from declared defaults plus the process environment.
/// Secret indirections are resolved with blocking file reads.
pub fn load_sync(fields: &[FieldSpec]) -> Result<ConfigSnapshot> {
    let mut snapshot = apply_defaults(fields);

    for field in fields {
        let Some(raw) = read_env(field) else { continue };
        let resolved = match secret_path(&raw) {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(content) => content.trim().to_string(),
                Err(err) => {
                    handle_secret_failure(field, path, &err.to_string(), &mut snapshot)?;
                    continue;
                }
            },
            None => raw,
        };
        install_env_value(field, &resolved, &mut snapshot)?;
    }

    check_required(fields, &snapshot)?;
    Ok(snapshot)
}

/// Async variant: every `file://` secret read runs in parallel, and all of
/// them complete before this returns.
pub async fn load_async(fields: &[FieldSpec]) -> Result<ConfigSnapshot> {
    let mut snapshot = apply_defaults(fields);

    // First pass: pull the environment and split plain values from secrets.
    let mut plain: Vec<(usize, String)> = Vec::new();
    let mut secrets: Vec<(usize, String)> = Vec::new();
    for (idx, field) in fields.iter().enumerate() {
        let Some(raw) = read_env(field) else { continue };
        match secret_path(&raw) {
            Some(path) => secrets.push((idx, path.to_string())),
            None => plain.push((idx, raw)),
        }
    }

    for (idx, raw) in plain {
        install_env_value(&fields[idx], &raw, &mut snapshot)?;
    }

    let reads = secrets
        .iter()
        .map(|(_, path)| tokio::fs::read_to_string(path));
    let results = futures::future::join_all(reads).await;

    for ((idx, path), read) in secrets.iter().zip(results) {
        let field = &fields[*idx];
        match read {
            Ok(content) => install_env_value(field, content.trim(), &mut snapshot)?,
            Err(err) => handle_secret_failure(field, path, &err.to_string(), &mut snapshot)?,
        }
    }

    check_required(fields, &snapshot)?;
    Ok(snapshot)
}

pub(crate) fn apply_defaults(fields: &[FieldSpec]) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();
    for field in fields {
        if let Some(default) = &field.default {
            snapshot.set(&field.name, default.clone(), ConfigSource::Default);
        }
        if field.sensitive {
            snapshot.mark_sensitive(&field.name);
        }
    }
    snapshot
}

fn read_env(field: &FieldSpec) -> Option<String> {
    let var = field.env_var.as_deref()?;
    std::env::var(var).ok()
}

/// Returns the referenced path when the raw value is a secret indirection.
/// Indirection resolves exactly one level: file contents that themselves
/// start with `file://` are taken literally.
fn secret_path(raw: &str) -> Option<&str> {
    raw.strip_prefix(SECRET_PREFIX)
}

fn install_env_value(field: &FieldSpec, raw: &str, snapshot: &mut ConfigSnapshot) -> Result<()> {
    let origin = field.env_var.as_deref().unwrap_or(&field.name);
    let value: Value = field
        .convert(raw)
        .map_err(|e| e.with_context("env_var", origin))?;
    field.check(&value).map_err(|e| e.with_context("env_var", origin))?;
    snapshot.set(&field.name, value, ConfigSource::Env);
    Ok(())
}

fn handle_secret_failure(
    field: &FieldSpec,
    path: &str,
    reason: &str,
    snapshot: &mut ConfigSnapshot,
) -> Result<()> {
    if field.default.is_some() && !field.required {
        snapshot.push_warning(format!(
            "secret file '{path}' for field '{}' is unreadable ({reason}); using the declared default",
            field.name
        ));
        Ok(())
    } else {
        Err(FoundationError::configuration(format!(
            "cannot read secret file '{path}': {reason}"
        ))
        .with_context("field", &field.name)
        .with_context("path", path))
    }
}

pub(crate) fn check_required(fields: &[FieldSpec], snapshot: &ConfigSnapshot) -> Result<()> {
    for field in fields {
        if field.required && snapshot.get(&field.name).is_none() {
            let mut err = FoundationError::configuration(format!(
                "required field '{}' was not provided",
                field.name
            ))
            .with_context("field", &field.name);
            if let Some(var) = &field.env_var {
                err = err.with_context("env_var", var);
            }
            return Err(err);
        }
    }
    Ok(())
}
