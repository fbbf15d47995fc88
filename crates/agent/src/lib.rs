//! The orchestration loop of Tollgate.
//!
//! One turn runs **model → tools → model** until the model answers in plain
//! text or the round budget runs out:
//!
//! 1. **Stream** the model's response, forwarding text to the caller's sink
//! 2. **Collect** every tool invocation the model asked for
//! 3. **Dispatch** them concurrently; gated tools wait at the
//!    [`ConfirmationGate`] for a human decision first
//! 4. **Fold** the results back into the conversation in request order and
//!    call the model again
//!
//! Text the model wrote ahead of an action that was then denied is retracted
//! from what the user sees.

pub mod confirmation;
pub mod loop_runner;
pub mod sink;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use confirmation::{
    ConfirmationGate, ConfirmationHandle, ConfirmationOutcome, ConfirmationTicket,
    DEFAULT_CONFIRMATION_TIMEOUT,
};
pub use loop_runner::{AgentLoop, TurnOutcome, TurnRequest, TurnStatus};
pub use sink::{ApprovalError, ApprovalSurface, ChannelSink, StreamSink};
pub use stream_event::AgentStreamEvent;
pub use tokio_util::sync::CancellationToken;
