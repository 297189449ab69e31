//! Engine event stream
//!
//! Consumers subscribe for upload progress and cache changes instead of
//! polling job state. Events are broadcast; slow subscribers drop the
//! oldest events rather than blocking the engine.

use crate::models::HabitCompletion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// An upload job reached a progress checkpoint
    UploadProgress {
        habit_id: Uuid,
        job_id: Uuid,
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// An upload job finished; the completion record is durably inserted
    UploadCompleted {
        habit_id: Uuid,
        job_id: Uuid,
        completion: HabitCompletion,
        timestamp: DateTime<Utc>,
    },

    /// An upload job failed; progress is frozen at the last checkpoint
    UploadFailed {
        habit_id: Uuid,
        job_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// The completion cache was replaced with the server's truth
    CompletionsRefreshed {
        habit_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A completion was removed from the local cache
    CompletionDeleted {
        completion_id: Uuid,
        habit_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A habit and its completions were removed from the local cache
    HabitDeleted {
        habit_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for engine events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where no subscriber is listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("engine event dropped: no subscribers");
        }
    }
}
