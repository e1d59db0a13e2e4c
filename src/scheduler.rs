//! Export scheduler: background cadence, fan-out and lifecycle.
//!
//! One worker task per scheduler. Each tick collects a snapshot, hands it to
//! every sink in turn, then drains the pending event queue into the same sinks.
//! A failing or panicking sink never affects its siblings or the loop.

pub mod events;

pub use events::EventPublisher;

use crate::config::MonitorConfig;
use crate::error::{ConfigurationError, LifecycleError, MonitorError, SinkError};
use crate::event::Event;
use crate::scrub::scrub_display;
use crate::sink::{HttpSink, Sink};
use crate::stats::{StatsCollector, StatsSnapshot};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop()` waits for an in-flight tick before aborting the worker.
const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Created,
    Started,
    Stopped,
    Closed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Created => "created",
            SchedulerState::Started => "started",
            SchedulerState::Stopped => "stopped",
            SchedulerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub collection_failures: u64,
    pub snapshots_exported: u64,
    pub events_exported: u64,
    pub sink_failures: u64,
    /// Ticks aborted by a failure outside any sink.
    pub tick_failures: u64,
}

pub struct ExportScheduler {
    collector: Arc<dyn StatsCollector>,
    sinks: Arc<[Arc<dyn Sink>]>,
    interval: Duration,
    state: Mutex<SchedulerState>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    publisher: EventPublisher,
    events: Mutex<Option<Receiver<Event>>>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl ExportScheduler {
    /// `interval` of zero disables sampling: sinks still start, no worker runs.
    pub fn new(
        collector: Arc<dyn StatsCollector>,
        sinks: Vec<Arc<dyn Sink>>,
        interval: Duration,
        event_queue_capacity: usize,
    ) -> Self {
        let (publisher, receiver) = EventPublisher::new_pair(event_queue_capacity);
        Self {
            collector,
            sinks: sinks.into(),
            interval,
            state: Mutex::new(SchedulerState::Created),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
            publisher,
            events: Mutex::new(Some(receiver)),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
        }
    }

    /// Validate `config` and build the configured sinks. Any misconfiguration
    /// fails here, before anything starts.
    pub fn from_config(
        config: &MonitorConfig,
        collector: Arc<dyn StatsCollector>,
    ) -> Result<Self, MonitorError> {
        config.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigurationError::Invalid(msgs.join("; "))
        })?;

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
        if config.enabled {
            sinks.push(Arc::new(HttpSink::new(&config.http, config.render_params())?));
        } else {
            info!("Monitoring disabled; scheduler has no sinks");
        }

        Ok(Self::new(
            collector,
            sinks,
            Duration::from_millis(config.interval_ms),
            config.event_queue_capacity,
        ))
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    /// Handle for collaborators to queue events for the next tick.
    pub fn event_publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Start every sink, then spawn the worker. Outside a Tokio runtime this
    /// fails without touching state, unless sampling is disabled.
    pub fn start(&self) -> Result<(), LifecycleError> {
        let runtime = if self.interval.is_zero() {
            None
        } else {
            Some(Handle::try_current().map_err(|e| LifecycleError::NoRuntime(e.to_string()))?)
        };

        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Created => *state = SchedulerState::Started,
                SchedulerState::Started => return Ok(()),
                other => {
                    return Err(LifecycleError::InvalidTransition {
                        action: "start",
                        state: other.to_string(),
                    })
                }
            }
        }

        for sink in self.sinks.iter() {
            run_isolated(sink.as_ref(), "start", || sink.start());
        }

        let receiver = self.events.lock().take();
        if self.interval.is_zero() {
            // Nothing will drain the queue; refuse events instead of buffering them.
            drop(receiver);
            info!(sinks = self.sinks.len(), "Export scheduler started with sampling disabled");
            return Ok(());
        }
        let (Some(receiver), Some(runtime)) = (receiver, runtime) else {
            return Ok(());
        };

        let worker = Worker {
            collector: Arc::clone(&self.collector),
            sinks: Arc::clone(&self.sinks),
            interval: self.interval,
            cancel: self.cancel.clone(),
            stats: Arc::clone(&self.stats),
            events: receiver,
        };
        *self.worker.lock() = Some(runtime.spawn(worker.run()));

        info!(
            sinks = self.sinks.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Export scheduler started"
        );
        Ok(())
    }

    /// Cancel the worker, wait for it to exit, then stop every sink. Once this
    /// returns no sink receives another export call.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        {
            let mut state = self.state.lock();
            match *state {
                SchedulerState::Started => *state = SchedulerState::Stopped,
                SchedulerState::Created | SchedulerState::Stopped => return Ok(()),
                SchedulerState::Closed => {
                    return Err(LifecycleError::InvalidTransition {
                        action: "stop",
                        state: SchedulerState::Closed.to_string(),
                    })
                }
            }
        }

        self.shutdown_worker().await;
        for sink in self.sinks.iter() {
            run_isolated(sink.as_ref(), "stop", || sink.stop());
        }
        info!("Export scheduler stopped");
        Ok(())
    }

    /// Close every sink. Stops first when running; safe without `start()`.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = SchedulerState::Closed;
            previous
        };

        match previous {
            SchedulerState::Closed => return Ok(()),
            SchedulerState::Started => {
                self.shutdown_worker().await;
                for sink in self.sinks.iter() {
                    run_isolated(sink.as_ref(), "stop", || sink.stop());
                }
            }
            SchedulerState::Created | SchedulerState::Stopped => {
                self.cancel.cancel();
            }
        }

        // Pending events are discarded.
        self.events.lock().take();
        for sink in self.sinks.iter() {
            run_isolated(sink.as_ref(), "close", || sink.close());
        }
        info!("Export scheduler closed");
        Ok(())
    }

    async fn shutdown_worker(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            return;
        };
        match timeout(WORKER_SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => debug!("Export worker exited"),
            Ok(Err(err)) => error!(error = %err, "Export worker terminated abnormally"),
            Err(_) => {
                warn!(
                    timeout_secs = WORKER_SHUTDOWN_TIMEOUT.as_secs(),
                    "Export worker did not stop in time; aborting"
                );
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ExportScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

/// State owned by the background task.
struct Worker {
    collector: Arc<dyn StatsCollector>,
    sinks: Arc<[Arc<dyn Sink>]>,
    interval: Duration,
    cancel: CancellationToken,
    stats: Arc<RwLock<SchedulerStats>>,
    events: Receiver<Event>,
}

impl Worker {
    async fn run(mut self) {
        debug!("Export worker started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let tick = AssertUnwindSafe(self.tick()).catch_unwind().await;
            if let Err(payload) = tick {
                self.stats.write().tick_failures += 1;
                error!(
                    panic = %panic_message(payload.as_ref()),
                    "Unexpected failure during export tick"
                );
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        // Dropping the receiver here discards anything still queued.
        debug!("Export worker stopped");
    }

    async fn tick(&mut self) {
        self.stats.write().ticks += 1;

        match self.collector.collect().await {
            Ok(snapshot) => self.export_snapshot(&snapshot).await,
            Err(err) => {
                self.stats.write().collection_failures += 1;
                warn!(error = %scrub_display(&err), "Stats collection failed; skipping snapshot");
            }
        }

        while !self.cancel.is_cancelled() {
            let Ok(event) = self.events.try_recv() else {
                break;
            };
            self.export_event(&event).await;
        }
    }

    async fn export_snapshot(&self, snapshot: &StatsSnapshot) {
        for sink in self.sinks.iter() {
            if self.cancel.is_cancelled() {
                return;
            }
            match isolated(sink.export_snapshot(snapshot)).await {
                Ok(()) => self.stats.write().snapshots_exported += 1,
                Err(err) => {
                    self.stats.write().sink_failures += 1;
                    error!(
                        sink = %sink.name(),
                        error = %scrub_display(&err),
                        "Sink failed to export snapshot"
                    );
                }
            }
        }
    }

    async fn export_event(&self, event: &Event) {
        for sink in self.sinks.iter() {
            if self.cancel.is_cancelled() {
                return;
            }
            match isolated(sink.export_event(event)).await {
                Ok(()) => self.stats.write().events_exported += 1,
                Err(err) => {
                    self.stats.write().sink_failures += 1;
                    error!(
                        sink = %sink.name(),
                        event = %event,
                        error = %scrub_display(&err),
                        "Sink failed to export event"
                    );
                }
            }
        }
    }
}

/// Await a sink export, turning a panic into an error.
async fn isolated<F>(export: F) -> Result<(), SinkError>
where
    F: Future<Output = Result<(), SinkError>>,
{
    match AssertUnwindSafe(export).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(SinkError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn run_isolated(sink: &dyn Sink, action: &str, f: impl FnOnce()) {
    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
        error!(
            sink = %sink.name(),
            action,
            panic = %panic_message(payload.as_ref()),
            "Sink lifecycle call failed"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
