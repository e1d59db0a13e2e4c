//! Layered loading: defaults, optional TOML file, environment.

use super::{MonitorConfig, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_EVENT_QUEUE_CAPACITY, DEFAULT_INTERVAL_MS};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use std::path::Path;

/// Prefix of every environment override, e.g. `CLUSTERSCOPE_HTTP__INDEX_PREFIX`.
pub const ENV_PREFIX: &str = "CLUSTERSCOPE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration, lowest precedence first: defaults, `path` (if it
    /// exists), then environment variables.
    pub fn load(path: Option<&Path>) -> Result<MonitorConfig, ConfigError> {
        let mut builder = Self::builder_with_defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }
        Self::finish(builder.add_source(Self::environment()))
    }

    /// Load from an in-memory TOML document, still honouring the environment.
    pub fn load_from_str(toml: &str) -> Result<MonitorConfig, ConfigError> {
        let builder = Self::builder_with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(Self::environment());
        Self::finish(builder)
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("enabled", true)?
            .set_default("interval_ms", DEFAULT_INTERVAL_MS)?
            .set_default("output_cluster_name", true)?
            .set_default("event_queue_capacity", DEFAULT_EVENT_QUEUE_CAPACITY as u64)?
            .set_default("http.hosts", vec!["localhost:9200"])?
            .set_default("http.connect_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS)?
            .set_default("http.read_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS * 10)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("http.hosts")
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<MonitorConfig, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
