//! WebSocket adapter - JSON chat gateway.
//!
//! Every connection gets its own [`Agent`]; providers and tools are shared.
//! Clients send `{"message": ..., "conversation_id"?, "model"?, "use_agent"?}`
//! and receive a sequence of typed frames ending in `done` or `error`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentEvent, AgentStatus, ModelOrchestrator, Role};
use crate::error::Error;
use crate::memory::ConversationStore;
use crate::tools::ToolRegistry;
use crate::Result;

/// Tool results are cut to this many characters on the wire.
pub const DISPLAY_LIMIT: usize = 500;

fn default_true() -> bool {
    true
}

/// Client request frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub use_agent: bool,
}

/// Server frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConversationId { conversation_id: String },
    Status { status: AgentStatus, iteration: usize },
    Chunk { content: String },
    ToolCall { name: String, arguments: Map<String, Value> },
    ToolResult { name: String, result: String },
    Done { full_response: String },
    Error { message: String },
}

impl From<AgentEvent> for ServerFrame {
    fn from(event: AgentEvent) -> Self {
        match event {
            AgentEvent::Status { status, iteration } => Self::Status { status, iteration },
            AgentEvent::Chunk { content } => Self::Chunk { content },
            AgentEvent::ToolCall { name, arguments } => Self::ToolCall { name, arguments },
            AgentEvent::ToolResult { name, result } => Self::ToolResult {
                name,
                result: super::truncate(&result, DISPLAY_LIMIT).to_string(),
            },
            AgentEvent::Done { full_response } => Self::Done { full_response },
            AgentEvent::Error { message } => Self::Error { message },
        }
    }
}

/// Shared pieces every connection needs.
#[derive(Clone)]
pub struct WebSocketGateway {
    orchestrator: Arc<ModelOrchestrator>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    max_iterations: usize,
}

impl WebSocketGateway {
    pub fn new(
        orchestrator: Arc<ModelOrchestrator>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        max_iterations: usize,
    ) -> Self {
        Self {
            orchestrator,
            tools,
            store,
            max_iterations,
        }
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("WebSocket gateway listening on ws://{}", addr);
        self.run(listener).await
    }

    /// Accept connections from an already bound listener.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("New connection from {}", peer);

            let session = self.session();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, session).await {
                    debug!("Connection {} ended: {}", peer, e);
                }
            });
        }
    }

    /// A fresh chat session with its own agent.
    pub fn session(&self) -> ChatSession {
        let agent = Agent::new(self.orchestrator.clone(), self.tools.clone(), self.max_iterations);
        ChatSession::new(agent, self.store.clone())
    }
}

async fn handle_connection(stream: TcpStream, mut session: ChatSession) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = serde_json::to_string(&frame)?;
            ws_sender.send(WsMessage::Text(text.into())).await?;
        }
        ws_sender.close().await?;
        Ok::<(), Error>(())
    });

    while let Some(message) = ws_receiver.next().await {
        match message? {
            WsMessage::Text(text) => session.handle(text.as_str(), &tx).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    match writer.await {
        Ok(result) => result,
        Err(e) => Err(Error::Transport(format!("Writer task failed: {}", e))),
    }
}

/// One client's conversation state.
pub struct ChatSession {
    agent: Agent,
    store: Arc<dyn ConversationStore>,
    conversation_id: Option<String>,
}

impl ChatSession {
    pub fn new(agent: Agent, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            agent,
            store,
            conversation_id: None,
        }
    }

    /// Handle one client frame. Any failure becomes a single `error` frame.
    pub async fn handle(&mut self, text: &str, out: &mpsc::UnboundedSender<ServerFrame>) {
        if let Err(e) = self.try_handle(text, out).await {
            warn!("Chat request failed: {}", e);
            send(out, AgentEvent::from(&e).into());
        }
    }

    async fn try_handle(&mut self, text: &str, out: &mpsc::UnboundedSender<ServerFrame>) -> Result<()> {
        let request: ChatRequest = serde_json::from_str(text)
            .map_err(|e| Error::Transport(format!("Invalid request: {}", e)))?;

        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.switch_to(&conversation_id).await?;

        self.store
            .append_message(&conversation_id, Role::User, &request.message)
            .await?;
        send(out, ServerFrame::ConversationId { conversation_id: conversation_id.clone() });

        let response = if request.use_agent {
            self.run_agent(&request, out).await?
        } else {
            let response = self
                .agent
                .simple_chat(&request.message, request.model.as_deref())
                .await?;
            send(out, ServerFrame::Chunk { content: response.clone() });
            send(out, ServerFrame::Done { full_response: response.clone() });
            response
        };

        self.store
            .append_message(&conversation_id, Role::Assistant, &response)
            .await?;
        Ok(())
    }

    async fn run_agent(&mut self, request: &ChatRequest, out: &mpsc::UnboundedSender<ServerFrame>) -> Result<String> {
        let events = self.agent.chat(&request.message, request.model.as_deref());
        tokio::pin!(events);

        let mut full_response = String::new();
        while let Some(event) = events.next().await {
            let event = event?;
            if let AgentEvent::Done { full_response: text } = &event {
                full_response = text.clone();
            }
            send(out, event.into());
        }
        Ok(full_response)
    }

    /// Load the stored history when the client moves to another conversation.
    async fn switch_to(&mut self, conversation_id: &str) -> Result<()> {
        if self.conversation_id.as_deref() == Some(conversation_id) {
            return Ok(());
        }

        let history = self.store.list_messages(conversation_id).await?;
        debug!("Switching to conversation {} ({} messages)", conversation_id, history.len());
        self.agent
            .restore(history.into_iter().map(|m| m.into_chat_message()).collect());
        self.conversation_id = Some(conversation_id.to_string());
        Ok(())
    }
}

fn send(out: &mpsc::UnboundedSender<ServerFrame>, frame: ServerFrame) {
    if out.send(frame).is_err() {
        debug!("Client went away, dropping frame");
    }
}
