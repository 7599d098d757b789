//! Logging and telemetry configuration.
//!
//! Both types load through the declarative schema machinery in
//! `foundation-config`, which gives them `PROVIDE_*` environment loading,
//! per-field source tracking, and `file://` secret indirection for free.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::json;

use foundation_config::{convert, ConfigSnapshot, FieldSpec, SchemaConfig};
use foundation_errors::Result;

use crate::format::ConsoleFormatter;
use crate::level::Level;
use crate::ratelimit::RateLimitSpec;

/// Immutable logging settings. Owned by the hub after initialization and
/// borrowed read-only by the processors.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub default_level: Level,
    /// Per-module overrides, longest dotted-prefix match wins.
    pub module_levels: BTreeMap<String, Level>,
    pub console_formatter: ConsoleFormatter,
    pub use_color: bool,
    pub use_emoji: bool,
    /// Forces JSON output regardless of the formatter.
    pub json_output: bool,
    pub rate_limits: BTreeMap<String, RateLimitSpec>,
    pub enabled_event_sets: Vec<String>,
    pub suppress_event_enrichment: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::Warning,
            module_levels: BTreeMap::new(),
            console_formatter: ConsoleFormatter::KeyValue,
            use_color: true,
            use_emoji: true,
            json_output: false,
            rate_limits: BTreeMap::new(),
            enabled_event_sets: Vec::new(),
            suppress_event_enrichment: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_default_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    pub fn with_module_level(mut self, module: impl Into<String>, level: Level) -> Self {
        self.module_levels.insert(module.into(), level);
        self
    }

    pub fn with_formatter(mut self, formatter: ConsoleFormatter) -> Self {
        self.console_formatter = formatter;
        self
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn with_emoji(mut self, use_emoji: bool) -> Self {
        self.use_emoji = use_emoji;
        self
    }

    pub fn with_json_output(mut self, json_output: bool) -> Self {
        self.json_output = json_output;
        self
    }

    pub fn with_rate_limit(mut self, logger: impl Into<String>, rate: f64, capacity: f64) -> Self {
        self.rate_limits
            .insert(logger.into(), RateLimitSpec { rate, capacity });
        self
    }

    pub fn with_event_sets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_event_sets = names.into_iter().map(Into::into).collect();
        self
    }

    /// The level gate for a logger name: the longest `module_levels` key
    /// that is a dotted prefix of the name, else the default level.
    pub fn effective_level(&self, logger_name: &str) -> Level {
        let mut best: Option<(&str, Level)> = None;
        for (prefix, level) in &self.module_levels {
            let matches = logger_name == prefix
                || (logger_name.starts_with(prefix.as_str())
                    && logger_name.as_bytes().get(prefix.len()) == Some(&b'.'));
            if matches && best.map(|(b, _)| prefix.len() > b.len()).unwrap_or(true) {
                best = Some((prefix, *level));
            }
        }
        best.map(|(_, level)| level).unwrap_or(self.default_level)
    }

    /// Resolves the color policy against the environment and the stream:
    /// `NO_COLOR` always wins, `FORCE_COLOR` overrides TTY detection, and a
    /// non-terminal stream disables color.
    pub fn resolve_color(&self, stream_is_terminal: bool) -> bool {
        if std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if std::env::var_os("FORCE_COLOR").is_some() {
            return true;
        }
        self.use_color && stream_is_terminal
    }
}

impl SchemaConfig for LoggingConfig {
    fn schema() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("default_level")
                .env_var("PROVIDE_LOG_LEVEL")
                .default(json!("WARNING"))
                .converter(convert::log_level())
                .description("Default log level"),
            FieldSpec::new("module_levels")
                .env_var("PROVIDE_LOG_MODULE_LEVELS")
                .default(json!({}))
                .converter(convert::module_levels())
                .description("Per-module level overrides, `mod:LEVEL,...`"),
            FieldSpec::new("console_formatter")
                .env_var("PROVIDE_LOG_FORMATTER")
                .default(json!("key_value"))
                .choices(vec![json!("key_value"), json!("json"), json!("plain")]),
            FieldSpec::new("use_color")
                .env_var("PROVIDE_LOG_USE_COLOR")
                .default(json!(true))
                .converter(convert::boolean()),
            FieldSpec::new("use_emoji")
                .env_var("PROVIDE_LOG_USE_EMOJI")
                .default(json!(true))
                .converter(convert::boolean()),
            FieldSpec::new("json_output")
                .env_var("PROVIDE_JSON_OUTPUT")
                .default(json!(false))
                .converter(convert::boolean()),
            FieldSpec::new("rate_limits")
                .env_var("PROVIDE_LOG_RATE_LIMIT_PER_LOGGER")
                .default(json!({}))
                .converter(convert::rate_limits())
                .description("Token buckets, `logger:rate:capacity,...`"),
            FieldSpec::new("enabled_event_sets")
                .env_var("PROVIDE_ENABLED_EVENT_SETS")
                .default(json!([]))
                .converter(convert::comma_list()),
        ]
    }

    fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self> {
        let mut module_levels = BTreeMap::new();
        for (module, level) in snapshot.object_value("module_levels")? {
            module_levels.insert(
                module.clone(),
                Level::from_str(level.as_str().unwrap_or_default())?,
            );
        }

        let mut rate_limits = BTreeMap::new();
        for (logger, spec) in snapshot.object_value("rate_limits")? {
            let rate = spec.get("rate").and_then(serde_json::Value::as_f64);
            let capacity = spec.get("capacity").and_then(serde_json::Value::as_f64);
            if let (Some(rate), Some(capacity)) = (rate, capacity) {
                rate_limits.insert(logger.clone(), RateLimitSpec { rate, capacity });
            }
        }

        let formatter_name = snapshot.str_value("console_formatter")?;
        let console_formatter = ConsoleFormatter::parse(formatter_name).ok_or_else(|| {
            foundation_errors::FoundationError::configuration(format!(
                "unknown console formatter '{formatter_name}'"
            ))
        })?;

        Ok(Self {
            default_level: Level::from_str(snapshot.str_value("default_level")?)?,
            module_levels,
            console_formatter,
            use_color: snapshot.bool_value("use_color")?,
            use_emoji: snapshot.bool_value("use_emoji")?,
            json_output: snapshot.bool_value("json_output")?,
            rate_limits,
            enabled_event_sets: snapshot.str_list("enabled_event_sets")?,
            suppress_event_enrichment: false,
        })
    }
}

/// Logging plus service identity and tracing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub logging: LoggingConfig,
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub trace_sample_rate: f64,
    pub otel_enabled: bool,
    pub metrics_enabled: bool,
    pub profile: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            service_name: None,
            service_version: None,
            trace_sample_rate: 1.0,
            otel_enabled: false,
            metrics_enabled: false,
            profile: "default".to_string(),
        }
    }
}

impl SchemaConfig for TelemetryConfig {
    fn schema() -> Vec<FieldSpec> {
        let mut fields = LoggingConfig::schema();
        fields.extend([
            FieldSpec::new("service_name").env_var("PROVIDE_SERVICE_NAME"),
            FieldSpec::new("otel_service_name")
                .env_var("OTEL_SERVICE_NAME")
                .description("Fallback for service_name"),
            FieldSpec::new("service_version").env_var("PROVIDE_SERVICE_VERSION"),
            FieldSpec::new("trace_sample_rate")
                .env_var("OTEL_TRACE_SAMPLE_RATE")
                .default(json!(1.0))
                .converter(convert::float_in_range(0.0, 1.0)),
            FieldSpec::new("otel_enabled")
                .default(json!(false))
                .converter(convert::boolean()),
            FieldSpec::new("metrics_enabled")
                .default(json!(false))
                .converter(convert::boolean()),
            FieldSpec::new("profile")
                .env_var("PROVIDE_PROFILE")
                .default(json!("default")),
        ]);
        fields
    }

    fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self> {
        let service_name = snapshot
            .get("service_name")
            .or_else(|| snapshot.get("otel_service_name"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        Ok(Self {
            logging: LoggingConfig::from_snapshot(snapshot)?,
            service_name,
            service_version: snapshot
                .get("service_version")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            trace_sample_rate: snapshot.f64_value("trace_sample_rate")?,
            otel_enabled: snapshot.bool_value("otel_enabled")?,
            metrics_enabled: snapshot.bool_value("metrics_enabled")?,
            profile: snapshot.str_value("profile")?.to_string(),
        })
    }
}
