//! Shared test doubles for loop tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tollgate_core::error::GatewayError;
use tollgate_core::gateway::{GatewayRequest, ModelGateway, Segment, SegmentStream, replay};
use tollgate_core::tool::{ToolContext, ToolDefinition, ToolResult};

use crate::confirmation::{ConfirmationGate, ConfirmationOutcome, ConfirmationTicket};
use crate::sink::{ApprovalError, ApprovalSurface, StreamSink};
use crate::stream_event::AgentStreamEvent;

/// A gateway that replays one scripted segment list per call.
///
/// Panics if called more often than scripted, unless built with
/// [`ScriptedGateway::repeating`].
pub struct ScriptedGateway {
    rounds: Mutex<VecDeque<Vec<Segment>>>,
    fallback: Option<Vec<Segment>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new(rounds: Vec<Vec<Segment>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the same segments.
    pub fn repeating(round: Vec<Segment>) -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            fallback: Some(round),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: GatewayRequest) -> Result<SegmentStream, GatewayError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.rounds.lock().unwrap().pop_front();
        let segments = next
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| panic!("ScriptedGateway: no script for call #{call}"));
        Ok(replay(segments))
    }
}

/// A gateway whose every call fails before streaming.
pub struct FailingGateway(pub GatewayError);

#[async_trait::async_trait]
impl ModelGateway for FailingGateway {
    fn name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _request: GatewayRequest) -> Result<SegmentStream, GatewayError> {
        Err(self.0.clone())
    }
}

/// A gateway that opens a stream and never sends anything on it.
#[derive(Default)]
pub struct StallingGateway {
    senders: Mutex<Vec<mpsc::Sender<Result<Segment, GatewayError>>>>,
}

#[async_trait::async_trait]
impl ModelGateway for StallingGateway {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn invoke(&self, _request: GatewayRequest) -> Result<SegmentStream, GatewayError> {
        let (tx, rx) = mpsc::channel(1);
        self.senders.lock().unwrap().push(tx);
        Ok(rx)
    }
}

/// Records everything a turn sends to its sink.
#[derive(Default)]
pub struct RecordingSink {
    deltas: Mutex<Vec<String>>,
    finals: Mutex<Vec<String>>,
    aborts: Mutex<Vec<String>>,
    events: Mutex<Vec<&'static str>>,
}

impl RecordingSink {
    pub fn deltas(&self) -> Vec<String> {
        self.deltas.lock().unwrap().clone()
    }

    pub fn finals(&self) -> Vec<String> {
        self.finals.lock().unwrap().clone()
    }

    pub fn aborts(&self) -> Vec<String> {
        self.aborts.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl StreamSink for RecordingSink {
    fn on_text_delta(&self, delta: &str) {
        self.deltas.lock().unwrap().push(delta.to_string());
    }

    fn on_final_text(&self, text: &str) {
        self.finals.lock().unwrap().push(text.to_string());
    }

    fn on_abort(&self, reason: &str) {
        self.aborts.lock().unwrap().push(reason.to_string());
    }

    fn on_event(&self, event: &AgentStreamEvent) {
        self.events.lock().unwrap().push(event.event_type());
    }
}

/// An approval surface that answers immediately, or never when `decision` is `None`.
pub struct ScriptedApprovals {
    gate: ConfirmationGate,
    decision: Option<bool>,
    requested: Mutex<Vec<ConfirmationTicket>>,
    closed: Mutex<Vec<(ConfirmationTicket, ConfirmationOutcome)>>,
}

impl ScriptedApprovals {
    pub fn new(gate: ConfirmationGate, decision: Option<bool>) -> Self {
        Self {
            gate,
            decision,
            requested: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<ConfirmationTicket> {
        self.requested.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<(ConfirmationTicket, ConfirmationOutcome)> {
        self.closed.lock().unwrap().clone()
    }
}

impl ApprovalSurface for ScriptedApprovals {
    fn request_approval(&self, ticket: &ConfirmationTicket) -> Result<(), ApprovalError> {
        self.requested.lock().unwrap().push(ticket.clone());
        if let Some(approved) = self.decision {
            self.gate.resolve(&ticket.ticket_id, approved);
        }
        Ok(())
    }

    fn ticket_closed(&self, ticket: &ConfirmationTicket, outcome: ConfirmationOutcome) {
        self.closed.lock().unwrap().push((ticket.clone(), outcome));
    }
}

/// A tool that counts how often its handler ran.
pub fn counting_tool(name: &str, gated: bool) -> (ToolDefinition, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let definition = ToolDefinition::new(
        name,
        format!("Test tool {name}"),
        move |_args: Value, _ctx: Option<ToolContext>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ToolResult::ok(json!({ "ok": true })))
            }
        },
    );
    let definition = if gated {
        definition.requiring_confirmation()
    } else {
        definition
    };
    (definition, calls)
}

/// A tool that sleeps before answering with its own name.
pub fn sleeping_tool(name: &str, millis: u64) -> ToolDefinition {
    let label = name.to_string();
    ToolDefinition::new(
        name,
        "Sleeps, then answers",
        move |_args: Value, _ctx: Option<ToolContext>| {
            let label = label.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(ToolResult::ok(json!({ "tool": label })))
            }
        },
    )
}

/// A tool named `whoami` that returns the context it was given.
pub fn context_echo_tool() -> ToolDefinition {
    ToolDefinition::new(
        "whoami",
        "Reports the caller",
        |_args: Value, ctx: Option<ToolContext>| async move {
            Ok(ToolResult::ok(
                serde_json::to_value(ctx.unwrap_or_default()).unwrap_or_default(),
            ))
        },
    )
    .with_context()
}
