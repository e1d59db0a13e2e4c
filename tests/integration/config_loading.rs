//! Layered configuration loading from TOML files and environment.

use clusterscope::logging::{LogFormat, LogOutput};
use clusterscope::ConfigLoader;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
    assert!(config.enabled);
    assert_eq!(config.interval_ms, 10_000);
    assert_eq!(config.http.hosts, vec!["localhost:9200".to_string()]);
    assert_eq!(config.http.index_time_format, "%Y.%m.%d");
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_toml_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("monitor.toml");
    fs::write(
        &config_file,
        r#"
interval_ms = 5000
cluster_name = "prod"
output_cluster_name = false

[http]
hosts = ["https://monitor:pw@es1:9243/proxy", "es2"]
index_prefix = ".ops"
connect_timeout_ms = 2000

[logging]
level = "debug"
format = "json"
output = "stderr"

[logging.modules]
"clusterscope::sink" = "trace"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(Some(&config_file)).unwrap();
    assert_eq!(config.interval_ms, 5_000);
    assert_eq!(config.cluster_name, "prod");
    assert!(!config.render_params().output_cluster_name);
    assert_eq!(config.http.hosts.len(), 2);
    assert_eq!(config.http.index_prefix, ".ops");
    assert_eq!(config.http.connect_timeout_ms, 2_000);
    assert_eq!(config.http.read_timeout_ms, 60_000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.output, LogOutput::Stderr);
    assert_eq!(
        config.logging.modules.get("clusterscope::sink").map(String::as_str),
        Some("trace")
    );
}

#[test]
fn test_invalid_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("broken.toml");
    fs::write(&config_file, "interval_ms = [not toml").unwrap();
    assert!(ConfigLoader::load(Some(&config_file)).is_err());
}

#[test]
fn test_environment_overrides_file() {
    std::env::set_var("CLUSTERSCOPE_HTTP__TEMPLATE_NAME", "ops_template");
    let config = ConfigLoader::load_from_str(
        r#"
[http]
template_name = "from_file"
"#,
    );
    std::env::remove_var("CLUSTERSCOPE_HTTP__TEMPLATE_NAME");

    assert_eq!(config.unwrap().http.template_name, "ops_template");
}
