//! Terminal rendering of a turn and inline approval prompts.
//!
//! Text streams to stdout. Everything else (tool activity, approval prompts,
//! retraction notices) goes to stderr so piping stdout captures only the
//! answer. Approvals are answered by typing `y` or `n` on the next line;
//! the answer travels back through the confirmation gate, not the sink.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tollgate_agent::{
    AgentStreamEvent, ApprovalError, ApprovalSurface, ConfirmationGate, ConfirmationOutcome,
    ConfirmationTicket, StreamSink,
};
use tollgate_core::summary::humanize_datetime;

/// Streams a turn to the terminal.
#[derive(Default)]
pub struct TerminalSink {
    /// What has been printed for the current turn
    shown: Mutex<String>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamSink for TerminalSink {
    fn on_text_delta(&self, delta: &str) {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(delta);
        let mut out = std::io::stdout();
        let _ = out.write_all(delta.as_bytes());
        let _ = out.flush();
    }

    fn on_final_text(&self, text: &str) {
        let shown = std::mem::take(&mut *self.shown.lock().unwrap_or_else(PoisonError::into_inner));
        if shown == text {
            println!();
        } else {
            // Something streamed earlier was retracted.
            println!();
            eprintln!("  ── revised answer ──");
            println!("{text}");
        }
    }

    fn on_abort(&self, reason: &str) {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        println!();
        eprintln!("  [aborted] {reason}");
    }

    fn on_event(&self, event: &AgentStreamEvent) {
        match event {
            AgentStreamEvent::ToolCall { name, .. } => {
                eprintln!("\n  ⚙ {name}");
            }
            AgentStreamEvent::ToolResult {
                name,
                success: false,
                output,
                ..
            } => {
                eprintln!("  ✗ {name}: {output}");
            }
            AgentStreamEvent::Retracted { .. } => {
                eprintln!("  (the text above is withdrawn: that action was not carried out)");
            }
            _ => {}
        }
    }
}

/// What happened to a line typed while a turn was running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Resolved { ticket_id: String, approved: bool },
    /// The ticket settled (e.g. timed out) before the answer arrived
    Expired { ticket_id: String },
    /// Not `y` / `n`
    Unrecognized,
    NothingPending,
}

/// Prints approval prompts and routes typed answers to the gate.
///
/// Answers go to the oldest waiting ticket unless the line names one, as in
/// `y a1b2c3d4`.
pub struct TerminalApprovals {
    gate: ConfirmationGate,
    waiting: Mutex<VecDeque<String>>,
}

impl TerminalApprovals {
    pub fn new(gate: ConfirmationGate) -> Self {
        Self {
            gate,
            waiting: Mutex::new(VecDeque::new()),
        }
    }

    pub fn waiting(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one typed line.
    pub fn answer(&self, line: &str) -> Answer {
        let mut words = line.split_whitespace();
        let approved = match words.next().map(str::to_ascii_lowercase).as_deref() {
            Some("y" | "yes" | "approve") => true,
            Some("n" | "no" | "deny") => false,
            _ => {
                return if self.waiting() == 0 {
                    Answer::NothingPending
                } else {
                    Answer::Unrecognized
                };
            }
        };

        let ticket_id = {
            let mut waiting = self.lock();
            match words.next() {
                Some(id) => match waiting.iter().position(|t| t == id) {
                    Some(index) => waiting.remove(index),
                    None => Some(id.to_string()),
                },
                None => waiting.pop_front(),
            }
        };
        let Some(ticket_id) = ticket_id else {
            return Answer::NothingPending;
        };

        if self.gate.resolve(&ticket_id, approved) {
            Answer::Resolved { ticket_id, approved }
        } else {
            Answer::Expired { ticket_id }
        }
    }
}

impl ApprovalSurface for TerminalApprovals {
    fn request_approval(&self, ticket: &ConfirmationTicket) -> Result<(), ApprovalError> {
        let queued = {
            let mut waiting = self.lock();
            waiting.push_back(ticket.ticket_id.clone());
            waiting.len()
        };

        eprintln!();
        eprintln!("  ┌─ approval needed [{}]", ticket.ticket_id);
        for line in ticket.human_summary.lines() {
            eprintln!("  │ {line}");
        }
        eprintln!(
            "  │ expires {}",
            humanize_datetime(&ticket.deadline.to_rfc3339())
        );
        if queued > 1 {
            eprintln!("  │ ({} approvals waiting; answers go oldest first)", queued);
        }
        eprintln!("  └─ approve? [y/n]");
        Ok(())
    }

    fn ticket_closed(&self, ticket: &ConfirmationTicket, outcome: ConfirmationOutcome) {
        self.lock().retain(|id| id != &ticket.ticket_id);
        match outcome {
            ConfirmationOutcome::Approved => eprintln!("  ✓ {} approved", ticket.tool_name),
            ConfirmationOutcome::Denied => eprintln!("  ✗ {} denied", ticket.tool_name),
            ConfirmationOutcome::TimedOut => {
                eprintln!("  ✗ {} timed out waiting for approval", ticket.tool_name)
            }
        }
    }
}
