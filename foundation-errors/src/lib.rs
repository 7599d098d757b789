//! # Error Taxonomy
//!
//! The shared error type for the foundation workspace. Every public API in
//! the sibling crates reports failures as a [`FoundationError`]: a stable
//! kind tag, a human-readable message, a context map with origin-specific
//! keys, and an optional chain of causes.
//!
//! ## Overview
//!
//! - [`ErrorKind`] is the closed set of failure categories (configuration,
//!   validation, not-found, circuit-open, ...). Its `Display` form is the
//!   stable code string carried on wire-facing messages, so callers can
//!   match on `error.code()` without depending on message text.
//! - [`FoundationError`] composes a kind with message, context, and causes.
//!   Causes are stored as [`anyhow::Error`] so arbitrary upstream errors
//!   (I/O, parsers, user callables) keep their backtraces.
//! - [`boundary`] provides the error-boundary helper used to capture context
//!   at subsystem edges.
//!
//! ## Usage
//!
//! ```rust
//! use foundation_errors::{ErrorKind, FoundationError, Result};
//!
//! fn lookup(name: &str) -> Result<()> {
//!     Err(FoundationError::not_found(format!("no component named {name}"))
//!         .with_context("dimension", "component"))
//! }
//!
//! let err = lookup("cache").unwrap_err();
//! assert_eq!(err.code(), "NOT_FOUND");
//! assert_eq!(err.context().get("dimension").map(String::as_str), Some("component"));
//! ```

pub mod boundary;

pub use boundary::ErrorBoundary;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Convenience alias used across the foundation crates.
pub type Result<T> = std::result::Result<T, FoundationError>;

/// Stable failure categories.
///
/// The `Display` form (via `thiserror`) is the machine-readable code tag;
/// it never changes once published. Resilience policies match retryable
/// errors against these tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("CONFIGURATION_ERROR")]
    Configuration,
    #[error("VALIDATION_ERROR")]
    Validation,
    #[error("NOT_FOUND")]
    NotFound,
    #[error("ALREADY_EXISTS")]
    AlreadyExists,
    #[error("AMBIGUOUS_LOOKUP")]
    AmbiguousLookup,
    #[error("DEPENDENCY_MISSING")]
    DependencyMissing,
    #[error("CIRCUIT_OPEN")]
    CircuitOpen,
    #[error("ALL_FALLBACKS_FAILED")]
    AllFallbacksFailed,
    #[error("RETRY_EXHAUSTED")]
    RetryExhausted,
    #[error("INTEGRITY_ERROR")]
    Integrity,
    #[error("FOUNDATION_ERROR")]
    Foundation,
}

impl ErrorKind {
    /// The stable code string for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::AmbiguousLookup => "AMBIGUOUS_LOOKUP",
            ErrorKind::DependencyMissing => "DEPENDENCY_MISSING",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::AllFallbacksFailed => "ALL_FALLBACKS_FAILED",
            ErrorKind::RetryExhausted => "RETRY_EXHAUSTED",
            ErrorKind::Integrity => "INTEGRITY_ERROR",
            ErrorKind::Foundation => "FOUNDATION_ERROR",
        }
    }
}

/// The workspace-wide error value.
///
/// Carries `{code, context, causes}` per the taxonomy contract. Context keys
/// are origin-specific (e.g. `dimension`, `field`, `env_var`); messages must
/// never contain values of configuration fields marked sensitive: callers
/// put the field *name* in context instead.
#[derive(Debug)]
pub struct FoundationError {
    kind: ErrorKind,
    message: String,
    context: BTreeMap<String, String>,
    causes: Vec<anyhow::Error>,
}

impl FoundationError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            causes: Vec::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn ambiguous_lookup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AmbiguousLookup, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Foundation, message)
    }

    /// A missing optional dependency. Carries the dependency name and the
    /// install hint in context so callers can surface an actionable message.
    pub fn dependency_missing(name: impl Into<String>, install_hint: impl Into<String>) -> Self {
        let name = name.into();
        let hint = install_hint.into();
        Self::new(
            ErrorKind::DependencyMissing,
            format!("optional dependency '{name}' is not available ({hint})"),
        )
        .with_context("dependency", name)
        .with_context("install_hint", hint)
    }

    /// Attaches a context key/value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Appends a cause. The first cause becomes [`std::error::Error::source`].
    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable code tag, e.g. `"CONFIGURATION_ERROR"`.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// The primary cause, if any.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.causes.first()
    }

    /// Every recorded cause in order. Fallback chains push one entry per
    /// failed slot.
    pub fn causes(&self) -> &[anyhow::Error] {
        &self.causes
    }
}

impl fmt::Display for FoundationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if !self.context.is_empty() {
            write!(f, " (")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for FoundationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes.first().map(AsRef::as_ref)
    }
}

impl From<std::io::Error> for FoundationError {
    fn from(err: std::io::Error) -> Self {
        FoundationError::internal(format!("I/O failure: {err}")).with_cause(err)
    }
}
