//! Groq client (OpenAI-compatible API with SSE delta streaming).

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::message::ChatMessage;
use crate::error::Error;
use crate::Result;

use super::http::HttpSession;
use super::stream::{self, ChunkStream, SseDecoder};
use super::types::{ChatCompletion, CompletionChunk};
use super::{wire_messages, ChatOptions, LlmClient, ModelResponse, ProviderCapabilities, StreamingMode};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.1-70b-versatile";

/// Groq API client using Bearer authentication.
#[derive(Clone)]
pub struct GroqClient {
    session: HttpSession,
    has_key: bool,
}

impl GroqClient {
    /// Create a new Groq client with API key.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::with_base_url(api_key, GROQ_API_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            session: HttpSession::bearer("groq", base_url, api_key, Duration::from_secs(60))?,
            has_key: !api_key.is_empty(),
        })
    }

    fn request_body(messages: &[ChatMessage], model: &str, options: &ChatOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": wire_messages(messages),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn parse_completion(completion: ChatCompletion) -> Result<ModelResponse> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in Groq response".to_string()))?;

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            model: completion.model,
            tokens_used: completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

/// Text deltas carried by a batch of SSE payloads.
fn payload_texts(payloads: Vec<String>) -> Vec<String> {
    payloads
        .into_iter()
        .filter_map(|data| match serde_json::from_str::<CompletionChunk>(&data) {
            Ok(chunk) => chunk.text(),
            Err(e) => {
                warn!("Failed to parse Groq chunk: {e}, data: {data}");
                None
            }
        })
        .collect()
}

#[async_trait]
impl LlmClient for GroqClient {
    fn id(&self) -> &str {
        "groq"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: StreamingMode::Native,
            local: false,
        }
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    async fn is_available(&self) -> bool {
        self.has_key && !self.session.is_closed()
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ModelResponse> {
        let body = Self::request_body(messages, model, options, false);
        let response = self.session.post("/chat/completions", &body).await?;
        let completion: ChatCompletion = response.json().await?;
        Self::parse_completion(completion)
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
            let response = session.post_stream("/chat/completions", &body).await?;
            let mut bytes = Box::pin(response.bytes_stream());
            let mut decoder = SseDecoder::new();

            while let Some(next) = session.next_chunk(&mut bytes).await? {
                for text in payload_texts(decoder.push(&next)) {
                    yield text;
                }
                if decoder.is_done() {
                    break;
                }
            }

            for text in payload_texts(decoder.finish()) {
                yield text;
            }
            debug!("Groq stream finished");
        })
    }

    fn close(&self) -> bool {
        self.session.close()
    }
}
