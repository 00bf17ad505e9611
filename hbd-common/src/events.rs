//! Analysis progress events and the broadcast EventBus
//!
//! A batch run reports its progress through these events. Consumers (the
//! CLI progress log, tests, a future UI) subscribe to the bus; emitting
//! with no subscribers is harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted while analyzing a batch of transcripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// Batch accepted and about to start
    BatchStarted {
        run_id: Uuid,
        file_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One transcript parsed
    FileParsed {
        run_id: Uuid,
        path: String,
        chat_name: String,
        message_count: usize,
        participant_count: usize,
        /// Lines that matched no dialect and had no message to continue
        dropped_lines: usize,
        timestamp: DateTime<Utc>,
    },

    /// One transcript could not be analyzed; the batch continues
    FileFailed {
        run_id: Uuid,
        path: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Wish clusters found in one chat
    ClustersDetected {
        run_id: Uuid,
        chat_name: String,
        cluster_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Cross-chat identity resolution finished
    IdentitiesResolved {
        run_id: Uuid,
        identity_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Batch finished
    BatchCompleted {
        run_id: Uuid,
        files_analyzed: usize,
        files_failed: usize,
        /// Identities at or above the confidence threshold
        identities_reported: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl AnalysisEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            AnalysisEvent::BatchStarted { .. } => "BatchStarted",
            AnalysisEvent::FileParsed { .. } => "FileParsed",
            AnalysisEvent::FileFailed { .. } => "FileFailed",
            AnalysisEvent::ClustersDetected { .. } => "ClustersDetected",
            AnalysisEvent::IdentitiesResolved { .. } => "IdentitiesResolved",
            AnalysisEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }

    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            AnalysisEvent::BatchStarted { run_id, .. }
            | AnalysisEvent::FileParsed { run_id, .. }
            | AnalysisEvent::FileFailed { run_id, .. }
            | AnalysisEvent::ClustersDetected { run_id, .. }
            | AnalysisEvent::IdentitiesResolved { run_id, .. }
            | AnalysisEvent::BatchCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Central event distribution for analysis progress
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lag and
/// lose the oldest events rather than blocking the pipeline.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AnalysisEvent,
    ) -> Result<usize, broadcast::error::SendError<AnalysisEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
