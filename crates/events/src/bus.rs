//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. The supervisor publishes a
//! [`RunEvent`] whenever a run finishes; subscribers such as the
//! [`CompletionNotifier`](crate::notifier::CompletionNotifier) react to them
//! without the supervisor waiting on their side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sublym_core::types::DbId;
use tokio::sync::broadcast;

/// Published after a run is finalized as completed.
pub const RUN_COMPLETED: &str = "run.completed";

/// Published after a run is finalized as failed (including timeouts).
pub const RUN_FAILED: &str = "run.failed";

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// A lifecycle event for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Dot-separated event name, e.g. `"run.completed"`.
    pub event_type: String,
    pub run_id: DbId,
    pub trace_id: String,
    pub dream_id: DbId,
    pub user_id: DbId,
    /// Event-specific data (artifact paths, error message).
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(
        event_type: impl Into<String>,
        run_id: DbId,
        trace_id: impl Into<String>,
        dream_id: DbId,
        user_id: DbId,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            run_id,
            trace_id: trace_id.into(),
            dream_id,
            user_id,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_completion(&self) -> bool {
        self.event_type == RUN_COMPLETED
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped silently when
    /// nobody is listening.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
