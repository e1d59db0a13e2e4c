//! Clusterscope: Cluster Telemetry Export
//!
//! Periodically samples the operational state of a cluster and ships it, together
//! with topology and lifecycle events, to pluggable sinks such as an HTTP
//! document store. Monitoring is best effort: failures degrade into log lines
//! and never take the observed process down.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod logging;
pub mod scheduler;
pub mod scrub;
pub mod sink;
pub mod stats;
pub mod types;

pub use config::{ConfigLoader, HttpSinkConfig, MonitorConfig};
pub use endpoint::{parse_host_with_path, Endpoint, ResolvedPath, Scheme};
pub use error::{CollectionError, ConfigurationError, LifecycleError, MonitorError, SinkError};
pub use event::{Event, EventKind, RenderParams};
pub use scheduler::{EventPublisher, ExportScheduler, SchedulerState, SchedulerStats};
pub use scrub::scrub;
pub use sink::{HttpSink, Sink};
pub use stats::{StatsCollector, StatsDocument, StatsSnapshot};
