//! Report notifications and the in-process bus that carries them

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::trace;

use super::model::ReportId;

/// Lifecycle notifications for a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportEvent {
    /// A report row exists and is waiting to be populated
    ReportCreated { report_id: ReportId },
    /// Every expected result has been appended
    ChecksGathered { report_id: ReportId },
    /// The report reached GENERATED; emitted exactly once per report
    ReportFinalized { report_id: ReportId },
}

impl ReportEvent {
    pub fn report_id(&self) -> ReportId {
        match self {
            ReportEvent::ReportCreated { report_id }
            | ReportEvent::ChecksGathered { report_id }
            | ReportEvent::ReportFinalized { report_id } => *report_id,
        }
    }
}

/// Fire-and-forget observer registry.
///
/// Every subscriber gets its own unbounded queue, so a slow consumer never
/// blocks a publisher and no event is dropped while the subscriber lives.
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<ReportEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> UnboundedReceiver<ReportEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: ReportEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event).is_ok());
        trace!(?event, subscribers = subscribers.len(), "Event published");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
