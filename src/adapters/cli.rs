//! CLI adapter - interactive and single-message command line interface.
//!
//! Renders agent events live: a spinner while the model is thinking, the
//! answer as it streams, and tool activity in colour.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use colored::*;
use futures_util::StreamExt;
use indicatif::ProgressBar;
use tracing::debug;

use crate::agent::{Agent, AgentEvent, AgentStatus, Role};
use crate::memory::ConversationStore;
use crate::ui;
use crate::Result;

/// CLI channel for interactive agent sessions.
pub struct CliChannel {
    agent: Agent,
    store: Arc<dyn ConversationStore>,
    session: String,
    model: Option<String>,
}

impl CliChannel {
    /// Create a new CLI channel recording turns under `session`.
    pub fn new(agent: Agent, store: Arc<dyn ConversationStore>, session: impl Into<String>) -> Self {
        Self {
            agent,
            store,
            session: session.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Continue the stored conversation of this session, if any.
    pub async fn resume(&mut self) -> Result<usize> {
        let history = self.store.list_messages(&self.session).await?;
        let count = history.len();
        self.agent
            .restore(history.into_iter().map(|m| m.into_chat_message()).collect());
        Ok(count)
    }

    /// Run a single message, rendering events; returns the full response.
    ///
    /// A failed turn is rendered as an error event before it is returned.
    pub async fn run_once(&mut self, message: &str) -> Result<String> {
        let mut spinner: Option<ProgressBar> = None;
        let result = self.turn(message, &mut spinner).await;
        if let Err(e) = &result {
            render(AgentEvent::from(e), &mut spinner)?;
        }
        result
    }

    async fn turn(&mut self, message: &str, spinner: &mut Option<ProgressBar>) -> Result<String> {
        self.store.append_message(&self.session, Role::User, message).await?;

        let mut full_response = String::new();
        {
            let events = self.agent.chat(message, self.model.as_deref());
            tokio::pin!(events);

            while let Some(event) = events.next().await {
                let event = event?;
                if let AgentEvent::Done { full_response: text } = &event {
                    full_response = text.clone();
                }
                render(event, spinner)?;
            }
        }

        self.store
            .append_message(&self.session, Role::Assistant, &full_response)
            .await?;
        Ok(full_response)
    }

    /// Run interactive REPL loop.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("\n{} ", "You ›".blue().bold());
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF
                break;
            }

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
                println!("Goodbye! 👋");
                break;
            }

            if input == "/clear" {
                self.agent.clear_conversation();
                ui::print_success("Conversation cleared");
                continue;
            }

            println!();
            if let Err(e) = self.run_once(input).await {
                debug!("Turn failed: {}", e);
            }
        }

        Ok(())
    }

    /// Clear conversation history.
    pub fn clear_history(&mut self) {
        self.agent.clear_conversation();
    }

    /// Get current history length.
    pub fn history_len(&self) -> usize {
        self.agent.conversation().len()
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

/// Draw one agent event on the terminal.
fn render(event: AgentEvent, spinner: &mut Option<ProgressBar>) -> io::Result<()> {
    match event {
        AgentEvent::Status { status: AgentStatus::Thinking, iteration } => {
            let label = if iteration == 1 {
                "Thinking".to_string()
            } else {
                format!("Thinking (step {})", iteration)
            };
            finish(spinner);
            *spinner = Some(ui::spinner(&label));
        }
        AgentEvent::Status { .. } => {}
        AgentEvent::Chunk { content } => {
            finish(spinner);
            print!("{}", content);
            io::stdout().flush()?;
        }
        AgentEvent::ToolCall { name, arguments } => {
            finish(spinner);
            println!();
            ui::print_tool_call(&name, &arguments);
        }
        AgentEvent::ToolResult { name, result } => {
            ui::print_tool_result(&name, &result);
        }
        AgentEvent::Done { .. } => {
            finish(spinner);
            println!();
        }
        AgentEvent::Error { message } => {
            finish(spinner);
            ui::print_error(&message);
        }
    }
    Ok(())
}

fn finish(spinner: &mut Option<ProgressBar>) {
    if let Some(bar) = spinner.take() {
        bar.finish_and_clear();
    }
}
