//! Error types for the telemetry export pipeline.
//!
//! Configuration errors are fatal and surface at construction time. Collection
//! and sink errors are recoverable: the scheduler logs them and moves on.

use thiserror::Error;

/// Fatal misconfiguration detected while building sinks or loading settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Empty host in endpoint specification: [{0}]")]
    EmptyHost(String),

    #[error("Invalid host [{host}] in endpoint specification: [{spec}]")]
    InvalidHost { spec: String, host: String },

    #[error("Invalid port [{port}] in endpoint specification: [{spec}]")]
    InvalidPort { spec: String, port: String },

    #[error("Unsupported scheme [{scheme}] in endpoint specification: [{spec}] (must be http or https)")]
    UnsupportedScheme { spec: String, scheme: String },

    #[error("Invalid url for endpoint [{spec}]: {reason}")]
    InvalidUrl { spec: String, reason: String },

    #[error("Failed to find a schema version in the bundled template")]
    MissingSchemaVersion,

    #[error("Invalid bundled template: {0}")]
    InvalidTemplate(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to load CA bundle [{path}]: {reason}")]
    CaBundle { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// The stats collaborator could not produce a snapshot for this tick.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Stats source unavailable: {0}")]
    Unavailable(String),

    #[error("Stats collection failed: {0}")]
    Source(#[from] anyhow::Error),
}

/// A single sink failed to export an artifact. Isolated per sink by the scheduler.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Template check failed: {0}")]
    Template(String),

    #[error("Could not connect to any configured host: [{0}]")]
    NoAvailableHost(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{failed} of {total} documents were rejected by the remote store")]
    Rejected { failed: usize, total: usize },

    #[error("Failed to render document: {0}")]
    Render(String),

    #[error("Sink [{0}] is closed")]
    Closed(String),

    #[error("Sink panicked during export: {0}")]
    Panicked(String),
}

/// Invalid transition of the scheduler lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot {action} scheduler in state {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("Cannot start scheduler outside a Tokio runtime: {0}")]
    NoRuntime(String),
}

/// Umbrella error for callers assembling the whole pipeline.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

impl From<config::ConfigError> for MonitorError {
    fn from(err: config::ConfigError) -> Self {
        MonitorError::Configuration(ConfigurationError::Load(err))
    }
}
