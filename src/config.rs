//! Configuration System
//!
//! Layered settings for the monitoring pipeline: built-in defaults, an optional
//! TOML file, then `CLUSTERSCOPE_*` environment variables. Tests included.

use crate::event::RenderParams;
use crate::logging::LoggingConfig;
use crate::types::{format_date, is_path_segment, is_valid_date_format};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod loader;

pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// When false the scheduler runs without sinks.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sampling interval; `0` disables the background worker.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub cluster_name: String,

    /// Whether event documents carry `cluster_name`.
    #[serde(default = "default_true")]
    pub output_cluster_name: bool,

    /// Pending events held between ticks.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    #[serde(default)]
    pub http: HttpSinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP document store sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSinkConfig {
    #[serde(default = "default_sink_name")]
    pub name: String,

    /// Host specifications, `[scheme://][user:pass@]host[:port][/path]`.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// strftime pattern for the date partition.
    #[serde(default = "default_index_time_format")]
    pub index_time_format: String,

    #[serde(default = "default_template_name")]
    pub template_name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// PEM bundle of extra root certificates trusted for `https` hosts.
    #[serde(default)]
    pub ca_bundle_path: Option<PathBuf>,
}

pub(crate) const DEFAULT_INTERVAL_MS: u64 = 10_000;
pub(crate) const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 10_000;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 6_000;

fn default_true() -> bool {
    true
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

fn default_sink_name() -> String {
    "http_exporter".to_string()
}

fn default_hosts() -> Vec<String> {
    vec!["localhost:9200".to_string()]
}

fn default_index_prefix() -> String {
    ".monitoring".to_string()
}

fn default_index_time_format() -> String {
    "%Y.%m.%d".to_string()
}

fn default_template_name() -> String {
    "monitoring".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS * 10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval_ms(),
            cluster_name: String::new(),
            output_cluster_name: true,
            event_queue_capacity: default_event_queue_capacity(),
            http: HttpSinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for HttpSinkConfig {
    fn default() -> Self {
        Self {
            name: default_sink_name(),
            hosts: default_hosts(),
            index_prefix: default_index_prefix(),
            index_time_format: default_index_time_format(),
            template_name: default_template_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            ca_bundle_path: None,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Sink(String, String),
    Scheduler(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Sink(name, msg) => write!(f, "Sink '{}': {}", name, msg),
            ValidationError::Scheduler(msg) => write!(f, "Scheduler: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl HttpSinkConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("Sink name cannot be empty".to_string());
        }
        if self.hosts.is_empty() {
            problems.push("At least one host is required".to_string());
        }
        if self.index_prefix.is_empty() {
            problems.push("Index prefix cannot be empty".to_string());
        } else if !is_path_segment(&self.index_prefix) {
            problems.push(format!(
                "Index prefix '{}' must be a single url path segment",
                self.index_prefix
            ));
        }
        if !is_valid_date_format(&self.index_time_format) {
            problems.push(format!(
                "Invalid index time format '{}'",
                self.index_time_format
            ));
        } else if !is_path_segment(&format_date(0, &self.index_time_format)) {
            problems.push(format!(
                "Index time format '{}' must render a single url path segment",
                self.index_time_format
            ));
        }
        if self.template_name.is_empty() {
            problems.push("Template name cannot be empty".to_string());
        }
        if self.connect_timeout_ms == 0 {
            problems.push("Connect timeout must be greater than zero".to_string());
        }
        if self.read_timeout_ms == 0 {
            problems.push("Read timeout must be greater than zero".to_string());
        }
        problems
    }
}

impl MonitorConfig {
    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors: Vec<ValidationError> = self
            .http
            .validate()
            .into_iter()
            .map(|msg| ValidationError::Sink(self.http.name.clone(), msg))
            .collect();

        if self.event_queue_capacity == 0 {
            errors.push(ValidationError::Scheduler(
                "Event queue capacity must be greater than zero".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            output_cluster_name: self.output_cluster_name,
        }
    }
}
