//! Pending event queue between collaborators and the export worker.

use crate::event::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tracing::warn;

/// Cloneable handle for publishing events; never blocks the caller.
#[derive(Clone)]
pub struct EventPublisher {
    sender: Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Bounded queue holding at most `capacity` pending events.
    pub fn new_pair(capacity: usize) -> (Self, Receiver<Event>) {
        let (sender, receiver) = channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Enqueue `event`. Returns false when it was dropped because the queue is
    /// full or the scheduler no longer accepts events.
    pub fn publish(&self, event: Event) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = %event, "Event queue full; dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = %event, "Event queue closed; dropping event");
                false
            }
        }
    }

    /// Events dropped so far across all clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
