//! Domain events: decoupled observation of what the orchestration loop does.
//!
//! The loop publishes as it goes; telemetry, audit logs, and tests subscribe
//! without the loop knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A model call is about to be issued
    RoundStarted {
        turn_id: String,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation produced its result (synthesized results included)
    ToolExecuted {
        turn_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A gated invocation is waiting for approval
    ConfirmationRequested {
        turn_id: String,
        ticket_id: String,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A confirmation wait ended
    ConfirmationResolved {
        turn_id: String,
        ticket_id: String,
        tool_name: String,
        outcome: String, // "approved", "denied", "timed_out"
        timestamp: DateTime<Utc>,
    },

    /// The turn hit its round budget
    RoundLimitReached {
        turn_id: String,
        max_rounds: u32,
        timestamp: DateTime<Utc>,
    },

    /// The turn produced its final text
    TurnCompleted {
        turn_id: String,
        rounds: u32,
        tool_calls: usize,
        retracted_rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// The turn was cancelled by its caller
    TurnCancelled {
        turn_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// The turn this event belongs to.
    pub fn turn_id(&self) -> &str {
        match self {
            Self::RoundStarted { turn_id, .. }
            | Self::ToolExecuted { turn_id, .. }
            | Self::ConfirmationRequested { turn_id, .. }
            | Self::ConfirmationResolved { turn_id, .. }
            | Self::RoundLimitReached { turn_id, .. }
            | Self::TurnCompleted { turn_id, .. }
            | Self::TurnCancelled { turn_id, .. } => turn_id,
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Slow subscribers lag and lose events; publishers never block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
