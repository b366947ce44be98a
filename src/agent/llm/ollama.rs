//! Ollama client for local models (NDJSON streaming).
//!
//! Availability is probed once, on first use, and memoized for the lifetime
//! of the client. A runtime that goes away later is only noticed through a
//! failed call.

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::agent::message::ChatMessage;
use crate::Result;

use super::http::HttpSession;
use super::stream::{self, ChunkStream, LineBuffer};
use super::types::{OllamaChatResponse, OllamaTags};
use super::{wire_messages, ChatOptions, LlmClient, ModelResponse, ProviderCapabilities, StreamingMode};

const DEFAULT_MODEL: &str = "llama3.1";

#[derive(Clone)]
pub struct OllamaClient {
    session: HttpSession,
    available: Arc<OnceCell<bool>>,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(120))
    }

    /// `timeout` bounds a batch call and each wait for streamed output.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            session: HttpSession::no_auth("ollama", base_url, timeout)?,
            available: Arc::new(OnceCell::new()),
        })
    }

    async fn probe(&self) -> bool {
        match self.session.get("/api/tags").await {
            Ok(_) => {
                info!("Ollama runtime detected at {}", self.session.url(""));
                true
            }
            Err(e) => {
                debug!("Ollama not reachable: {}", e);
                false
            }
        }
    }

    fn request_body(messages: &[ChatMessage], model: &str, options: &ChatOptions, stream: bool) -> Value {
        json!({
            "model": model,
            "messages": wire_messages(messages),
            "stream": stream,
            "options": {"temperature": options.temperature}
        })
    }

    fn parse_response(response: OllamaChatResponse, model: &str) -> ModelResponse {
        ModelResponse {
            content: response.message.map(|m| m.content).unwrap_or_default(),
            model: model.to_string(),
            tokens_used: response.eval_count.unwrap_or(0) + response.prompt_eval_count.unwrap_or(0),
            finish_reason: "stop".to_string(),
        }
    }
}

/// Decode NDJSON lines; returns the texts and whether `done` was reached.
fn line_texts(lines: Vec<String>) -> (Vec<String>, bool) {
    let mut texts = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<OllamaChatResponse>(&line) {
            Ok(chunk) => {
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        texts.push(message.content);
                    }
                }
                if chunk.done {
                    return (texts, true);
                }
            }
            Err(e) => warn!("Failed to parse Ollama line: {e}, data: {line}"),
        }
    }
    (texts, false)
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn id(&self) -> &str {
        "ollama"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: StreamingMode::Native,
            local: true,
        }
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.probe()).await
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        if !self.is_available().await {
            return Ok(Vec::new());
        }
        let tags: OllamaTags = self.session.get("/api/tags").await?.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ModelResponse> {
        let body = Self::request_body(messages, model, options, false);
        let response: OllamaChatResponse = self.session.post("/api/chat", &body).await?.json().await?;
        Ok(Self::parse_response(response, model))
    }

    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> ChunkStream {
        let body = Self::request_body(messages, model, options, true);
        let session = self.session.clone();

        stream::boxed(try_stream! {
            let response = session.post_stream("/api/chat", &body).await?;
            let mut bytes = Box::pin(response.bytes_stream());
            let mut lines = LineBuffer::new();

            while let Some(next) = session.next_chunk(&mut bytes).await? {
                let (texts, done) = line_texts(lines.push(&next));
                for text in texts {
                    yield text;
                }
                if done {
                    return;
                }
            }

            let (texts, _) = line_texts(lines.finish().into_iter().collect());
            for text in texts {
                yield text;
            }
        })
    }

    fn close(&self) -> bool {
        self.session.close()
    }
}
