//! Confirmation gate: human approval for side-effecting tool invocations.
//!
//! Each gated invocation gets a [`ConfirmationTicket`] in a shared, mutex-guarded
//! map. The loop awaits the ticket's [`ConfirmationHandle`]; an approval surface
//! (chat button, terminal prompt) calls [`ConfirmationGate::resolve`] from
//! wherever its input arrives. The wait races a oneshot against a deadline, and
//! removal from the map is the single point that decides who won.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a gated invocation waits for a decision by default.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Terminal state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    TimedOut,
}

impl ConfirmationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ConfirmationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight approval wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationTicket {
    /// Gate-assigned, 8 hex characters (fits in chat callback payloads)
    pub ticket_id: String,
    /// The model-assigned invocation id this ticket gates
    pub invocation_id: String,
    pub tool_name: String,
    /// What the approver is shown
    pub human_summary: String,
    /// Turn that opened the ticket, used to reject everything on cancellation
    pub turn_id: String,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

struct PendingTicket {
    ticket: ConfirmationTicket,
    responder: oneshot::Sender<bool>,
}

/// Registry of live tickets, shared by every conversation in the process.
///
/// Cloning is cheap and clones share the same map.
#[derive(Clone, Default)]
pub struct ConfirmationGate {
    pending: Arc<Mutex<HashMap<String, PendingTicket>>>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingTicket>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a ticket in the pending state and return the handle to await it on.
    pub fn open(
        &self,
        turn_id: &str,
        invocation_id: &str,
        tool_name: &str,
        human_summary: impl Into<String>,
        timeout: Duration,
    ) -> ConfirmationHandle {
        let (tx, rx) = oneshot::channel();
        let created_at = Utc::now();
        let deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let ticket = {
            let mut guard = self.lock();
            let ticket_id = loop {
                let candidate = short_id();
                if !guard.contains_key(&candidate) {
                    break candidate;
                }
            };
            let ticket = ConfirmationTicket {
                ticket_id: ticket_id.clone(),
                invocation_id: invocation_id.to_string(),
                tool_name: tool_name.to_string(),
                human_summary: human_summary.into(),
                turn_id: turn_id.to_string(),
                created_at,
                deadline,
            };
            guard.insert(
                ticket_id,
                PendingTicket {
                    ticket: ticket.clone(),
                    responder: tx,
                },
            );
            ticket
        };

        info!(
            ticket = %ticket.ticket_id,
            tool = %ticket.tool_name,
            timeout_ms = timeout.as_millis() as u64,
            "Confirmation requested"
        );

        ConfirmationHandle {
            gate: self.clone(),
            ticket,
            receiver: rx,
            timeout,
        }
    }

    /// Deliver a decision. Returns `false` if the ticket is unknown or
    /// already resolved, in which case nothing changes.
    pub fn resolve(&self, ticket_id: &str, approved: bool) -> bool {
        let mut guard = self.lock();
        let Some(entry) = guard.remove(ticket_id) else {
            debug!(ticket = %ticket_id, "Resolve for unknown or settled ticket ignored");
            return false;
        };
        // Sent while the map is still locked, so a racing timeout that
        // finds the ticket gone can always read the decision.
        let _ = entry.responder.send(approved);
        info!(
            ticket = %ticket_id,
            tool = %entry.ticket.tool_name,
            approved,
            "Confirmation resolved"
        );
        true
    }

    pub fn get(&self, ticket_id: &str) -> Option<ConfirmationTicket> {
        self.lock().get(ticket_id).map(|p| p.ticket.clone())
    }

    /// Live tickets, oldest first, optionally limited to one turn.
    pub fn list_pending(&self, turn_id: Option<&str>) -> Vec<ConfirmationTicket> {
        let guard = self.lock();
        let mut tickets: Vec<ConfirmationTicket> = guard
            .values()
            .map(|p| p.ticket.clone())
            .filter(|t| turn_id.is_none_or(|id| t.turn_id == id))
            .collect();
        tickets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tickets
    }

    /// Deny every live ticket opened by `turn_id`. Returns how many were denied.
    pub fn reject_all_for(&self, turn_id: &str) -> usize {
        let ids: Vec<String> = {
            let guard = self.lock();
            guard
                .iter()
                .filter(|(_, p)| p.ticket.turn_id == turn_id)
                .map(|(id, _)| id.clone())
                .collect()
        };

        ids.iter().filter(|id| self.resolve(id, false)).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// The waiting side of one ticket.
///
/// Dropping it without waiting (e.g. the turn was cancelled) removes the
/// ticket from the gate.
pub struct ConfirmationHandle {
    gate: ConfirmationGate,
    ticket: ConfirmationTicket,
    receiver: oneshot::Receiver<bool>,
    timeout: Duration,
}

impl ConfirmationHandle {
    pub fn ticket(&self) -> &ConfirmationTicket {
        &self.ticket
    }

    /// Wait for a decision or the deadline, whichever comes first.
    pub async fn wait(mut self) -> ConfirmationOutcome {
        match tokio::time::timeout(self.timeout, &mut self.receiver).await {
            Ok(Ok(true)) => ConfirmationOutcome::Approved,
            Ok(Ok(false)) => ConfirmationOutcome::Denied,
            // Sender gone without a decision
            Ok(Err(_)) => ConfirmationOutcome::Denied,
            Err(_) => {
                let removed = self.gate.lock().remove(&self.ticket.ticket_id).is_some();
                if removed {
                    warn!(
                        ticket = %self.ticket.ticket_id,
                        tool = %self.ticket.tool_name,
                        "Confirmation timed out"
                    );
                    ConfirmationOutcome::TimedOut
                } else {
                    // resolve() won the race after the timer fired
                    match self.receiver.try_recv() {
                        Ok(true) => ConfirmationOutcome::Approved,
                        _ => ConfirmationOutcome::Denied,
                    }
                }
            }
        }
    }
}

impl Drop for ConfirmationHandle {
    fn drop(&mut self) {
        self.gate.lock().remove(&self.ticket.ticket_id);
    }
}

fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
