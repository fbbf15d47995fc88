//! `tollgate chat`: interactive or single-message chat.

use std::sync::Arc;

use tokio::sync::mpsc;
use tollgate_agent::{AgentLoop, CancellationToken, ConfirmationGate, TurnOutcome, TurnRequest};
use tollgate_config::AppConfig;
use tollgate_core::error::Error;
use tollgate_core::event::EventBus;
use tollgate_core::message::{Conversation, Message};
use tollgate_core::tool::ToolContext;
use tollgate_providers::AnthropicGateway;
use tracing::debug;

use crate::terminal::{Answer, TerminalApprovals, TerminalSink};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TOLLGATE_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add `api_key` to {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let gateway = Arc::new(AnthropicGateway::from_config(&config)?);
    let tools = Arc::new(tollgate_tools::default_registry(config.scratch_dir())?);
    let gate = ConfirmationGate::new();
    let agent = AgentLoop::from_config(
        gateway,
        &config,
        Arc::clone(&tools),
        gate.clone(),
        Arc::new(EventBus::default()),
    );

    let session = Session {
        agent,
        sink: Arc::new(TerminalSink::new()),
        approvals: Arc::new(TerminalApprovals::new(gate)),
        context: ToolContext {
            user_id: std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok(),
            source_channel: Some("terminal".into()),
            ..Default::default()
        },
    };
    let mut lines = spawn_stdin_lines();
    let mut conv = Conversation::new();

    if let Some(msg) = message {
        conv.push(Message::user(msg));
        session.turn(&mut conv, &mut lines).await?;
        return Ok(());
    }

    println!();
    println!("  Tollgate: interactive mode");
    println!();
    println!("  Model:     {}", config.model);
    println!(
        "  Tools:     {} ({} need approval)",
        tools.len(),
        tools.iter().filter(|t| t.requires_confirmation).count()
    );
    println!("  Scratch:   {}", config.scratch_dir().display());
    println!();
    println!("  Type your message and press Enter. Ctrl+C cancels a running answer.");
    println!("  Type 'exit' to quit.");
    println!();

    loop {
        prompt("  You > ");
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        conv.push(Message::user(input));
        println!();
        match session.turn(&mut conv, &mut lines).await {
            Ok(_) => {}
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

struct Session {
    agent: AgentLoop,
    sink: Arc<TerminalSink>,
    approvals: Arc<TerminalApprovals>,
    context: ToolContext,
}

impl Session {
    /// Run one turn while routing typed lines to pending approvals.
    ///
    /// A failed or cancelled turn is dropped from the history so the next
    /// message starts from a consistent conversation.
    async fn turn(
        &self,
        conv: &mut Conversation,
        lines: &mut mpsc::Receiver<String>,
    ) -> Result<Option<TurnOutcome>, Error> {
        let before = conv.messages.len().saturating_sub(1);
        let cancel = CancellationToken::new();
        let request = TurnRequest::new()
            .with_sink(self.sink.clone())
            .with_approvals(self.approvals.clone())
            .with_context(self.context.clone())
            .with_cancel(cancel.clone());

        let result = {
            let turn = self.agent.run_turn(conv, request);
            tokio::pin!(turn);
            let mut stdin_open = true;

            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    line = lines.recv(), if stdin_open => match line {
                        Some(line) => self.route_line(&line),
                        None => {
                            // Nobody can answer any more.
                            stdin_open = false;
                            debug!("stdin closed during turn");
                        }
                    },
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        eprintln!("\n  cancelling...");
                        cancel.cancel();
                    }
                }
            }
        };

        match result {
            Ok(outcome) => {
                if !outcome.is_complete() {
                    eprintln!("  (stopped after {} rounds)", outcome.rounds);
                }
                Ok(Some(outcome))
            }
            Err(Error::Cancelled) => {
                conv.messages.truncate(before);
                eprintln!("  (cancelled; this exchange was not kept)");
                Ok(None)
            }
            Err(e) => {
                conv.messages.truncate(before);
                Err(e)
            }
        }
    }

    fn route_line(&self, line: &str) {
        match self.approvals.answer(line) {
            Answer::Resolved { .. } => {}
            Answer::Expired { ticket_id } => {
                eprintln!("  [{ticket_id}] is no longer waiting for an answer");
            }
            Answer::Unrecognized => eprintln!("  answer y or n"),
            Answer::NothingPending => {
                eprintln!("  (still working; wait for the answer before typing)");
            }
        }
    }
}

fn prompt(text: &str) {
    use std::io::Write;
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Read stdin on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
