//! Export destinations.
//!
//! A [`Sink`] receives stats snapshots and cluster events from the scheduler's
//! worker and ships them somewhere. All calls for one sink come from that single
//! worker, in order. Lifecycle calls may be repeated safely.

pub mod http;
pub mod template;

pub use http::{HttpSink, HttpSinkStats};
pub use template::{IndexTemplate, SchemaVersion, TemplateDecision};

use crate::error::SinkError;
use crate::event::Event;
use crate::stats::StatsSnapshot;
use async_trait::async_trait;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used to attribute log lines and errors.
    fn name(&self) -> &str;

    fn start(&self) {}

    fn stop(&self) {}

    /// Release held resources. Idempotent.
    fn close(&self) {}

    async fn export_snapshot(&self, snapshot: &StatsSnapshot) -> Result<(), SinkError>;

    async fn export_event(&self, event: &Event) -> Result<(), SinkError>;
}
