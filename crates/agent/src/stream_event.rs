//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is the structured side channel of a turn: text chunks
//! plus what the loop is doing with tools and approvals. Front ends forward
//! these to clients; the terminal front end renders them directly.

use serde::{Deserialize, Serialize};
use tollgate_core::gateway::Usage;

use crate::confirmation::ConfirmationOutcome;

/// Events emitted by the agent during a turn.
///
/// - `chunk`: partial text from the model
/// - `tool_call`: the model asked for a tool
/// - `tool_result`: an invocation produced its result
/// - `confirmation_requested`: a gated invocation awaits approval
/// - `confirmation_resolved`: the approval wait ended
/// - `retracted`: a round's text was withdrawn
/// - `final_text`: the authoritative answer for the turn
/// - `done`: the turn is complete
/// - `error`: the turn was aborted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text from the model.
    Chunk { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool invocation completed (possibly with a synthesized failure).
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// Approval is needed before `tool_name` runs.
    ConfirmationRequested {
        ticket_id: String,
        tool_name: String,
        summary: String,
    },

    ConfirmationResolved {
        ticket_id: String,
        tool_name: String,
        outcome: ConfirmationOutcome,
    },

    /// Text streamed during `round` must no longer be shown.
    Retracted { round: u32 },

    /// Replaces everything streamed so far.
    FinalText { text: String },

    /// The turn is complete.
    Done {
        turn_id: String,
        usage: Option<Usage>,
        rounds: u32,
        tool_calls_made: usize,
    },

    /// The turn was aborted.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ConfirmationRequested { .. } => "confirmation_requested",
            Self::ConfirmationResolved { .. } => "confirmation_resolved",
            Self::Retracted { .. } => "retracted",
            Self::FinalText { .. } => "final_text",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}
