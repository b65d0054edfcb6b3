//! Event bus for run observability
//!
//! Tokio broadcast channel plus optional pluggable sinks. Publishing never
//! fails a run: missing receivers are normal and sink faults, panics
//! included, are logged and dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::EngineEvent;
use crate::state::StateSnapshot;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error a sink may report; the engine only logs it.
#[derive(Debug, thiserror::Error)]
#[error("trace sink {sink} failed: {message}")]
pub struct SinkError {
    pub sink: String,
    pub message: String,
}

/// External tracing/observability collaborator.
///
/// Receives events and post-commit snapshots. Nothing it returns can
/// change the course of a run.
pub trait TraceSink: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &EngineEvent) -> Result<(), SinkError>;

    /// Called after each committed stage with the new snapshot.
    fn on_snapshot(&self, _run_id: &str, _snapshot: &StateSnapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channel and attached sinks
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    sinks: RwLock<Vec<Arc<dyn TraceSink>>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    pub fn attach(&self, sink: Arc<dyn TraceSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    fn sinks(&self) -> Vec<Arc<dyn TraceSink>> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish an event to subscribers and sinks.
    pub fn publish(&self, event: EngineEvent) {
        let event_type = event.event_type();

        for sink in self.sinks() {
            match catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event_type, sink = sink.name(), "Trace sink rejected event: {}", e)
                }
                Err(_) => warn!(event_type, sink = sink.name(), "Trace sink panicked on event"),
            }
        }

        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Hand a committed snapshot to every sink.
    pub fn publish_snapshot(&self, run_id: &str, snapshot: &StateSnapshot) {
        for sink in self.sinks() {
            match catch_unwind(AssertUnwindSafe(|| sink.on_snapshot(run_id, snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    run_id,
                    version = snapshot.version,
                    sink = sink.name(),
                    "Trace sink rejected snapshot: {}",
                    e
                ),
                Err(_) => warn!(
                    run_id,
                    version = snapshot.version,
                    sink = sink.name(),
                    "Trace sink panicked on snapshot"
                ),
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that keeps every event in memory, for tests and post-run dumps.
#[derive(Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<EngineEvent>>,
    snapshots: std::sync::Mutex<Vec<u64>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Versions of the snapshots received, in order
    pub fn snapshot_versions(&self) -> Vec<u64> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TraceSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &EngineEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    fn on_snapshot(&self, _run_id: &str, snapshot: &StateSnapshot) -> Result<(), SinkError> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.version);
        Ok(())
    }
}
