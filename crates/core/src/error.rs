//! Error types for the Tollgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the
//! turn-level error surfaced to callers of the orchestration loop.

use thiserror::Error;

/// The top-level error type for a conversational turn.
///
/// Only failures that abort the whole turn end up here. Per-invocation
/// tool failures are folded back to the model as failed tool results.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors (fatal to the turn) ---
    #[error("Model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller cancelled the turn.
    #[error("Turn cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a single model call. Always fatal to the turn.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of a single tool invocation.
///
/// None of these abort the loop: each one becomes a failed
/// [`ToolResult`](crate::tool::ToolResult) that the model gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool '{tool_name}' failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("denied")]
    ConfirmationDenied(String),

    #[error("timed out")]
    ConfirmationTimedOut { tool_name: String, timeout_ms: u64 },

    #[error("Tool invocation cancelled: {0}")]
    Cancelled(String),
}

impl ToolError {
    /// True for the two outcomes of a confirmation wait that must not run the handler.
    pub fn is_confirmation_failure(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationDenied(_) | Self::ConfirmationTimedOut { .. }
        )
    }
}
