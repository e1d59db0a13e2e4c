//! Logging System
//!
//! Structured logging through `tracing`. Level, format and destination come from
//! [`LoggingConfig`] and may be overridden by `CLUSTERSCOPE_LOG*` environment
//! variables. The pipeline is embedded in a host process, so installing the
//! global subscriber never fails when the host already installed one.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const LOG_ENV: &str = "CLUSTERSCOPE_LOG";
pub const LOG_FORMAT_ENV: &str = "CLUSTERSCOPE_LOG_FORMAT";
pub const LOG_OUTPUT_ENV: &str = "CLUSTERSCOPE_LOG_OUTPUT";
pub const LOG_MODULES_ENV: &str = "CLUSTERSCOPE_LOG_MODULES";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigurationError::Invalid(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
}

impl FromStr for LogOutput {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            other => Err(ConfigurationError::Invalid(format!(
                "Invalid log output: {} (must be 'stdout' or 'stderr')",
                other
            ))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-target levels, e.g. `clusterscope::sink = "debug"`
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            color: true,
            modules: BTreeMap::new(),
        }
    }
}

/// Install the global subscriber.
///
/// Priority order (highest to lowest):
/// 1. Environment variables (`CLUSTERSCOPE_LOG`, `CLUSTERSCOPE_LOG_FORMAT`, ...)
/// 2. `config`
/// 3. Defaults
///
/// A second call, or a host that already installed a subscriber, is a no-op.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ConfigurationError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;
    let use_color = config.map(|c| c.color).unwrap_or(true);

    let writer = match output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let base_subscriber = Registry::default().with(filter);
    let installed = match format {
        LogFormat::Json => base_subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Text => base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(use_color)
                    .with_writer(writer),
            )
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed; keeping it");
    }
    Ok(())
}

fn build_env_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ConfigurationError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }

    let env_modules = std::env::var(LOG_MODULES_ENV).ok();
    let directives = filter_directives(config, env_modules.as_deref());
    let mut directives = directives.into_iter();
    let mut filter = EnvFilter::new(directives.next().unwrap_or_else(default_log_level));
    for directive in directives {
        filter = filter.add_directive(directive.parse().map_err(|e| {
            ConfigurationError::Invalid(format!("Invalid log directive '{}': {}", directive, e))
        })?);
    }
    Ok(filter)
}

/// Base level first, then one `target=level` directive per module override.
/// Environment module overrides come after (and so win over) configured ones.
fn filter_directives(config: Option<&LoggingConfig>, env_modules: Option<&str>) -> Vec<String> {
    let level = config.map(|c| c.level.clone()).unwrap_or_else(default_log_level);
    let mut directives = vec![level.clone()];
    if level == "off" {
        return directives;
    }

    if let Some(config) = config {
        directives.extend(
            config
                .modules
                .iter()
                .map(|(module, level)| format!("{}={}", module, level)),
        );
    }

    if let Some(modules) = env_modules {
        for spec in modules.split(',') {
            if let Some((module, level)) = spec.split_once('=') {
                let (module, level) = (module.trim(), level.trim());
                if !module.is_empty() && !level.is_empty() {
                    directives.push(format!("{}={}", module, level));
                }
            }
        }
    }
    directives
}

fn determine_format(config: Option<&LoggingConfig>) -> Result<LogFormat, ConfigurationError> {
    env_or_configured(
        std::env::var(LOG_FORMAT_ENV).ok().as_deref(),
        config.map(|c| c.format).unwrap_or_default(),
    )
}

fn determine_output(config: Option<&LoggingConfig>) -> Result<LogOutput, ConfigurationError> {
    env_or_configured(
        std::env::var(LOG_OUTPUT_ENV).ok().as_deref(),
        config.map(|c| c.output).unwrap_or_default(),
    )
}

/// An environment override wins when set; an unparseable one is an error.
fn env_or_configured<T>(env_value: Option<&str>, configured: T) -> Result<T, ConfigurationError>
where
    T: FromStr<Err = ConfigurationError>,
{
    match env_value {
        Some(value) => value.parse(),
        None => Ok(configured),
    }
}
