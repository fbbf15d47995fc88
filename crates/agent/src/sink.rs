//! Caller-supplied collaborators of a turn: where text goes, and who approves.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::confirmation::{ConfirmationOutcome, ConfirmationTicket};
use crate::stream_event::AgentStreamEvent;

/// Receives a turn's output as it happens.
///
/// Deltas may later be retracted; `on_final_text` carries the authoritative
/// answer and the output channel is expected to replace what it showed.
pub trait StreamSink: Send + Sync {
    fn on_text_delta(&self, delta: &str);

    fn on_final_text(&self, text: &str);

    fn on_abort(&self, reason: &str);

    /// Structured progress (tool calls, approvals, retractions).
    fn on_event(&self, _event: &AgentStreamEvent) {}
}

#[derive(Debug, Clone, Error)]
pub enum ApprovalError {
    #[error("approval surface unavailable: {0}")]
    Unavailable(String),
}

/// Presents approval prompts to a human.
///
/// The decision does not come back through this trait: the surface (or
/// whatever receives the human's click) calls
/// [`ConfirmationGate::resolve`](crate::confirmation::ConfirmationGate::resolve).
pub trait ApprovalSurface: Send + Sync {
    fn request_approval(&self, ticket: &ConfirmationTicket) -> Result<(), ApprovalError>;

    /// The ticket reached a terminal state; update or dismiss the prompt.
    fn ticket_closed(&self, _ticket: &ConfirmationTicket, _outcome: ConfirmationOutcome) {}
}

/// A sink that forwards everything as [`AgentStreamEvent`]s over a channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AgentStreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: AgentStreamEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl StreamSink for ChannelSink {
    fn on_text_delta(&self, delta: &str) {
        self.send(AgentStreamEvent::Chunk {
            content: delta.to_string(),
        });
    }

    fn on_final_text(&self, text: &str) {
        self.send(AgentStreamEvent::FinalText {
            text: text.to_string(),
        });
    }

    fn on_abort(&self, reason: &str) {
        self.send(AgentStreamEvent::Error {
            message: reason.to_string(),
        });
    }

    fn on_event(&self, event: &AgentStreamEvent) {
        self.send(event.clone());
    }
}
