//! Model gateway: the abstraction over one streamed model call.
//!
//! A gateway takes the system prompt, the conversation so far, and the tool
//! schemas, and streams back an ordered sequence of [`Segment`]s: text
//! deltas, tool invocation requests, and exactly one terminating `Done`.
//!
//! Implementations: Anthropic Messages API (`tollgate-providers`), scripted
//! gateways in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::message::{Message, MessageToolCall};

/// One model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// The model to use (e.g., "claude-sonnet-4-5")
    pub model: String,

    /// System prompt, sent out of band from the history
    pub system_prompt: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Tools the model may invoke
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSchema>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The model-facing description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model mid-stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Opaque, model-assigned id used to pair the result
    pub id: String,
    pub name: String,
    /// Raw, unvalidated arguments
    pub arguments: serde_json::Value,
}

impl From<ToolInvocationRequest> for MessageToolCall {
    fn from(req: ToolInvocationRequest) -> Self {
        MessageToolCall {
            id: req.id,
            name: req.name,
            arguments: req.arguments,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single item of a streamed model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Partial assistant text
    TextDelta { text: String },

    /// The model wants a tool run
    ToolInvocation(ToolInvocationRequest),

    /// End of this call's stream
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn invocation(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self::ToolInvocation(ToolInvocationRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }

    pub fn done() -> Self {
        Self::Done { usage: None }
    }
}

/// Receiving half of a streamed model call.
///
/// Dropping it tells the producing task to stop; that is how an in-flight
/// call is aborted.
pub type SegmentStream = mpsc::Receiver<std::result::Result<Segment, GatewayError>>;

/// The core gateway trait.
///
/// The orchestration loop calls `invoke()` once per round without knowing
/// which backend is behind it.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Start a model call and return its segment stream.
    ///
    /// Segments for one call arrive in emission order and the stream ends
    /// with exactly one [`Segment::Done`]. Errors before the stream starts
    /// are returned directly; errors mid-stream are sent as `Err` items.
    async fn invoke(&self, request: GatewayRequest) -> std::result::Result<SegmentStream, GatewayError>;
}

/// Replay a fixed list of segments as a stream. Used by gateways that only
/// produce complete responses, and by tests.
pub fn replay(segments: Vec<Segment>) -> SegmentStream {
    let (tx, rx) = mpsc::channel(segments.len().max(1));
    for segment in segments {
        // Capacity covers every segment, so this never fails.
        let _ = tx.try_send(Ok(segment));
    }
    rx
}
