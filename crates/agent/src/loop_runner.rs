//! The orchestration loop implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tollgate_config::AppConfig;
use tollgate_core::error::{Error, GatewayError, ToolError};
use tollgate_core::event::{DomainEvent, EventBus};
use tollgate_core::gateway::{GatewayRequest, ModelGateway, Segment, ToolInvocationRequest, Usage};
use tollgate_core::message::{Conversation, Message, MessageToolCall};
use tollgate_core::tool::{ToolContext, ToolDefinition, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::confirmation::{ConfirmationGate, ConfirmationOutcome, DEFAULT_CONFIRMATION_TIMEOUT};
use crate::sink::{ApprovalSurface, StreamSink};
use crate::stream_event::AgentStreamEvent;

pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Appended when the round budget runs out before the model finishes.
pub const ROUND_LIMIT_NOTE: &str =
    "(I couldn't finish this within the allowed number of steps, so the task is incomplete.)";

/// Shown when every bit of text was retracted and the model said nothing afterwards.
pub const NOT_PERFORMED_NOTE: &str =
    "The requested action was not approved, so it was not carried out.";

const ROUND_SEPARATOR: &str = "\n\n";

/// Per-turn inputs supplied by the caller.
#[derive(Clone, Default)]
pub struct TurnRequest {
    pub sink: Option<Arc<dyn StreamSink>>,
    /// Without one, confirmation-gated tools are denied.
    pub approvals: Option<Arc<dyn ApprovalSurface>>,
    /// Caller identity for tools registered with `wants_context`
    pub context: Option<ToolContext>,
    pub cancel: CancellationToken,
}

impl TurnRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn StreamSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalSurface>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    pub fn with_context(mut self, context: ToolContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The model produced a final text-only response
    Completed,
    /// The round budget ran out; the text carries an incompleteness note
    RoundLimitExceeded,
}

/// Result of one conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub turn_id: String,
    /// What the user should see, retractions applied
    pub text: String,
    pub status: TurnStatus,
    /// Model calls made
    pub rounds: u32,
    pub tool_calls: usize,
    pub retracted_rounds: usize,
    pub usage: Usage,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// The loop that drives model rounds and tool dispatch for one turn at a time.
///
/// An `AgentLoop` holds no per-turn state, so one instance can serve many
/// conversations concurrently.
pub struct AgentLoop {
    /// The model gateway to use
    gateway: Arc<dyn ModelGateway>,

    /// The model to use
    model: String,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// Live approval tickets, shared with whoever resolves them
    gate: ConfirmationGate,

    system_prompt: String,

    /// Model calls allowed per turn
    max_rounds: u32,

    confirmation_timeout: Duration,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        gate: ConfirmationGate,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            gateway,
            model: model.into(),
            max_tokens: None,
            tools,
            gate,
            system_prompt: String::new(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            event_bus,
        }
    }

    /// Build a loop with model, prompt, and limits taken from config.
    pub fn from_config(
        gateway: Arc<dyn ModelGateway>,
        config: &AppConfig,
        tools: Arc<ToolRegistry>,
        gate: ConfirmationGate,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(gateway, config.model.clone(), tools, gate, event_bus)
            .with_system_prompt(config.agent.system_prompt.clone())
            .with_max_rounds(config.agent.max_rounds)
            .with_confirmation_timeout(config.agent.confirmation_timeout())
            .with_max_tokens(config.max_tokens)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of model calls per turn. Zero is treated as one.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Set the default max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn gate(&self) -> &ConfirmationGate {
        &self.gate
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one turn with no sink and no approval surface.
    pub async fn process(&self, conversation: &mut Conversation) -> Result<String, Error> {
        Ok(self.run_turn(conversation, TurnRequest::default()).await?.text)
    }

    /// Run one conversational turn to completion.
    ///
    /// The conversation must already end with the user's message. Assistant
    /// messages and tool results are appended as rounds complete. Gateway
    /// failures and cancellation abort the turn with an error; everything
    /// that goes wrong with a single tool is reported to the model instead.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        request: TurnRequest,
    ) -> Result<TurnOutcome, Error> {
        let mut context = request.context.clone().unwrap_or_default();
        if context.conversation_id.is_none() {
            context.conversation_id = Some(conversation.id.to_string());
        }

        let mut turn = TurnState {
            id: Uuid::new_v4().to_string(),
            request: &request,
            context,
            visible: String::new(),
            rounds: 0,
            tool_calls: 0,
            retracted_rounds: 0,
            any_rejected: false,
            usage: Usage::default(),
        };

        info!(
            turn = %turn.id,
            conversation_id = %conversation.id,
            messages = conversation.messages.len(),
            "Processing turn"
        );

        let result = self.drive(conversation, &mut turn).await;

        // Nothing from a finished turn may stay pending.
        let stale = self.gate.reject_all_for(&turn.id);
        if stale > 0 {
            debug!(turn = %turn.id, stale, "Rejected leftover confirmation tickets");
        }

        match result {
            Ok(status) => {
                if status == TurnStatus::Completed
                    && turn.any_rejected
                    && turn.visible.trim().is_empty()
                {
                    turn.append_note(NOT_PERFORMED_NOTE);
                }

                let outcome = TurnOutcome {
                    turn_id: turn.id.clone(),
                    text: turn.visible.clone(),
                    status,
                    rounds: turn.rounds,
                    tool_calls: turn.tool_calls,
                    retracted_rounds: turn.retracted_rounds,
                    usage: turn.usage,
                };

                if let Some(sink) = &request.sink {
                    sink.on_final_text(&outcome.text);
                    sink.on_event(&AgentStreamEvent::Done {
                        turn_id: outcome.turn_id.clone(),
                        usage: Some(outcome.usage),
                        rounds: outcome.rounds,
                        tool_calls_made: outcome.tool_calls,
                    });
                }

                self.event_bus.publish(DomainEvent::TurnCompleted {
                    turn_id: outcome.turn_id.clone(),
                    rounds: outcome.rounds,
                    tool_calls: outcome.tool_calls,
                    retracted_rounds: outcome.retracted_rounds,
                    timestamp: Utc::now(),
                });

                info!(
                    turn = %outcome.turn_id,
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    retracted = outcome.retracted_rounds,
                    status = ?outcome.status,
                    "Turn finished"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Some(sink) = &request.sink {
                    sink.on_abort(&err.to_string());
                }
                if matches!(err, Error::Cancelled) {
                    info!(turn = %turn.id, round = turn.rounds, "Turn cancelled");
                    self.event_bus.publish(DomainEvent::TurnCancelled {
                        turn_id: turn.id.clone(),
                        timestamp: Utc::now(),
                    });
                } else {
                    warn!(turn = %turn.id, round = turn.rounds, error = %err, "Turn failed");
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        turn: &mut TurnState<'_>,
    ) -> Result<TurnStatus, Error> {
        for round in 1..=self.max_rounds {
            turn.rounds = round;
            debug!(turn = %turn.id, round, "Starting round");
            self.event_bus.publish(DomainEvent::RoundStarted {
                turn_id: turn.id.clone(),
                round,
                timestamp: Utc::now(),
            });

            let round_start = turn.visible.len();
            let (round_text, invocations) = self.stream_round(conversation, turn).await?;

            if invocations.is_empty() {
                conversation.push(Message::assistant(round_text));
                return Ok(TurnStatus::Completed);
            }

            debug!(turn = %turn.id, round, invocations = invocations.len(), "Dispatching tools");
            turn.tool_calls += invocations.len();
            let resolutions = self.dispatch(&invocations, turn).await;

            let calls: Vec<MessageToolCall> = invocations
                .iter()
                .map(|inv| MessageToolCall::from(inv.request.clone()))
                .collect();
            conversation.push(Message::assistant_with_calls(round_text.clone(), calls));
            for (inv, resolution) in invocations.iter().zip(&resolutions) {
                conversation.push(Message::tool_result(&inv.request.id, &resolution.result));
            }

            if turn.request.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let mut rejected = false;
            for (inv, resolution) in invocations.iter().zip(&resolutions) {
                if resolution.disposition == Disposition::Rejected {
                    rejected = true;
                    debug!(
                        turn = %turn.id,
                        tool = %inv.request.name,
                        preceding_chars = inv.preceding_text.len(),
                        "Invocation rejected at the confirmation gate"
                    );
                }
            }
            turn.any_rejected |= rejected;

            // Text from a round with a rejected action was written assuming it
            // would happen, wherever it sits relative to the request.
            if rejected && !round_text.trim().is_empty() {
                info!(turn = %turn.id, round, "Retracting round text after a rejected confirmation");
                turn.visible.truncate(round_start);
                turn.retracted_rounds += 1;
                turn.event(&AgentStreamEvent::Retracted { round });
            }
        }

        warn!(
            turn = %turn.id,
            max_rounds = self.max_rounds,
            "Round limit reached before the model finished"
        );
        self.event_bus.publish(DomainEvent::RoundLimitReached {
            turn_id: turn.id.clone(),
            max_rounds: self.max_rounds,
            timestamp: Utc::now(),
        });
        turn.append_note(ROUND_LIMIT_NOTE);
        Ok(TurnStatus::RoundLimitExceeded)
    }

    /// One model call: forward text as it arrives and collect invocations.
    async fn stream_round(
        &self,
        conversation: &Conversation,
        turn: &mut TurnState<'_>,
    ) -> Result<(String, Vec<Invocation>), Error> {
        let request = GatewayRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            messages: conversation.messages.clone(),
            tools: self.tools.schemas_for_model(),
            max_tokens: self.max_tokens,
        };

        let cancel = turn.request.cancel.clone();
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.gateway.invoke(request) => result?,
        };

        let mut round_text = String::new();
        let mut invocations = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.recv() => next,
            };

            match next {
                Some(Ok(Segment::TextDelta { text })) => {
                    if text.is_empty() {
                        continue;
                    }
                    if round_text.is_empty() {
                        turn.begin_round_text();
                    }
                    round_text.push_str(&text);
                    turn.stream(&text);
                }
                Some(Ok(Segment::ToolInvocation(request))) => {
                    turn.event(&AgentStreamEvent::ToolCall {
                        id: request.id.clone(),
                        name: request.name.clone(),
                        input: request.arguments.clone(),
                    });
                    invocations.push(Invocation {
                        request,
                        preceding_text: round_text.clone(),
                    });
                }
                Some(Ok(Segment::Done { usage })) => {
                    if let Some(usage) = usage {
                        turn.add_usage(usage);
                    }
                    break;
                }
                Some(Err(err)) => return Err(err.into()),
                None => {
                    return Err(GatewayError::StreamInterrupted(
                        "stream ended without a done segment".into(),
                    )
                    .into());
                }
            }
        }

        Ok((round_text, invocations))
    }

    /// Resolve every invocation of a round concurrently; results keep request order.
    async fn dispatch(&self, invocations: &[Invocation], turn: &TurnState<'_>) -> Vec<Resolution> {
        join_all(
            invocations
                .iter()
                .map(|inv| self.resolve_invocation(&inv.request, turn)),
        )
        .await
    }

    async fn resolve_invocation(
        &self,
        request: &ToolInvocationRequest,
        turn: &TurnState<'_>,
    ) -> Resolution {
        let started = Instant::now();
        let resolution = self.lookup_and_run(request, turn).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.event_bus.publish(DomainEvent::ToolExecuted {
            turn_id: turn.id.clone(),
            tool_name: request.name.clone(),
            success: resolution.result.success,
            duration_ms,
            timestamp: Utc::now(),
        });
        turn.event(&AgentStreamEvent::ToolResult {
            id: request.id.clone(),
            name: request.name.clone(),
            output: resolution.result.to_content(),
            success: resolution.result.success,
        });

        resolution
    }

    async fn lookup_and_run(
        &self,
        request: &ToolInvocationRequest,
        turn: &TurnState<'_>,
    ) -> Resolution {
        let definition = match self.tools.lookup(&request.name) {
            Ok(definition) => definition,
            Err(err) => {
                warn!(tool = %request.name, "Model requested an unknown tool");
                return Resolution::from_error(&err);
            }
        };

        if let Err(err) = definition.validate(&request.arguments) {
            warn!(tool = %request.name, error = %err, "Rejected invalid tool arguments");
            return Resolution::from_error(&err);
        }

        if definition.requires_confirmation {
            match self.confirm(request, &definition, turn).await {
                ConfirmationOutcome::Approved => {}
                ConfirmationOutcome::Denied => {
                    return Resolution::from_error(&ToolError::ConfirmationDenied(
                        request.name.clone(),
                    ));
                }
                ConfirmationOutcome::TimedOut => {
                    return Resolution::from_error(&ToolError::ConfirmationTimedOut {
                        tool_name: request.name.clone(),
                        timeout_ms: self.confirmation_timeout.as_millis() as u64,
                    });
                }
            }
        }

        let result = tokio::select! {
            result = ToolRegistry::run(&definition, request.arguments.clone(), Some(turn.context.clone())) => result,
            _ = turn.request.cancel.cancelled() => {
                ToolResult::from_error(&ToolError::Cancelled(request.name.clone()))
            }
        };

        let disposition = if result.success {
            Disposition::Completed
        } else {
            Disposition::Failed
        };
        Resolution { result, disposition }
    }

    /// Open a ticket, present it, and wait for the decision.
    async fn confirm(
        &self,
        request: &ToolInvocationRequest,
        definition: &ToolDefinition,
        turn: &TurnState<'_>,
    ) -> ConfirmationOutcome {
        let Some(surface) = &turn.request.approvals else {
            warn!(tool = %request.name, "No approval surface for a gated tool; denying");
            return ConfirmationOutcome::Denied;
        };

        let summary = definition.summarize(&request.arguments);
        let handle = self.gate.open(
            &turn.id,
            &request.id,
            &request.name,
            summary,
            self.confirmation_timeout,
        );
        let ticket = handle.ticket().clone();

        self.event_bus.publish(DomainEvent::ConfirmationRequested {
            turn_id: turn.id.clone(),
            ticket_id: ticket.ticket_id.clone(),
            tool_name: ticket.tool_name.clone(),
            timestamp: Utc::now(),
        });
        turn.event(&AgentStreamEvent::ConfirmationRequested {
            ticket_id: ticket.ticket_id.clone(),
            tool_name: ticket.tool_name.clone(),
            summary: ticket.human_summary.clone(),
        });

        if let Err(err) = surface.request_approval(&ticket) {
            // The ticket stays open: it can still be resolved some other way
            // and otherwise times out.
            warn!(ticket = %ticket.ticket_id, error = %err, "Approval surface failed");
        }

        let outcome = tokio::select! {
            outcome = handle.wait() => outcome,
            _ = turn.request.cancel.cancelled() => ConfirmationOutcome::Denied,
        };

        surface.ticket_closed(&ticket, outcome);
        self.event_bus.publish(DomainEvent::ConfirmationResolved {
            turn_id: turn.id.clone(),
            ticket_id: ticket.ticket_id.clone(),
            tool_name: ticket.tool_name.clone(),
            outcome: outcome.as_str().to_string(),
            timestamp: Utc::now(),
        });
        turn.event(&AgentStreamEvent::ConfirmationResolved {
            ticket_id: ticket.ticket_id.clone(),
            tool_name: ticket.tool_name.clone(),
            outcome,
        });

        outcome
    }
}

/// Mutable bookkeeping for the turn in progress.
struct TurnState<'a> {
    id: String,
    request: &'a TurnRequest,
    context: ToolContext,
    /// Text the user currently sees, retractions applied
    visible: String,
    rounds: u32,
    tool_calls: usize,
    retracted_rounds: usize,
    /// Some invocation was denied or timed out
    any_rejected: bool,
    usage: Usage,
}

impl TurnState<'_> {
    fn stream(&mut self, text: &str) {
        self.visible.push_str(text);
        if let Some(sink) = &self.request.sink {
            sink.on_text_delta(text);
        }
    }

    /// Separate a new round's text from what came before.
    fn begin_round_text(&mut self) {
        if !self.visible.is_empty() && !self.visible.ends_with('\n') {
            self.stream(ROUND_SEPARATOR);
        }
    }

    fn append_note(&mut self, note: &str) {
        self.begin_round_text();
        self.stream(note);
    }

    fn event(&self, event: &AgentStreamEvent) {
        if let Some(sink) = &self.request.sink {
            sink.on_event(event);
        }
    }

    fn add_usage(&mut self, usage: Usage) {
        self.usage.prompt_tokens += usage.prompt_tokens;
        self.usage.completion_tokens += usage.completion_tokens;
        self.usage.total_tokens += usage.total_tokens;
    }
}

struct Invocation {
    request: ToolInvocationRequest,
    /// Round text the model had emitted when it asked for this invocation
    preceding_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Completed,
    /// Denied or timed out at the confirmation gate
    Rejected,
    Failed,
}

struct Resolution {
    result: ToolResult,
    disposition: Disposition,
}

impl Resolution {
    fn from_error(err: &ToolError) -> Self {
        let disposition = if err.is_confirmation_failure() {
            Disposition::Rejected
        } else {
            Disposition::Failed
        };
        Self {
            result: ToolResult::from_error(err),
            disposition,
        }
    }
}
