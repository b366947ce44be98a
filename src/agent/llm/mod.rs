//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ModelOrchestrator`] for model resolution and provider fallback
//! - Concrete implementations: Groq (SSE), Ollama (NDJSON), HuggingFace
//!   (simulated streaming)
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `mistral.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add to `ModelOrchestrator::from_config()`
//! 4. Add config fields in `config.rs`

mod http;
mod stream;
mod types;

#[cfg(test)]
pub(crate) mod mock_server;

pub mod groq;
pub mod huggingface;
pub mod ollama;
pub mod orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Result;

use super::message::ChatMessage;

pub use groq::GroqClient;
pub use huggingface::HuggingFaceClient;
pub use ollama::OllamaClient;
pub use orchestrator::{ModelOrchestrator, ProviderFailure};
pub use stream::{boxed, split_words, ChunkStream, LineBuffer, SseDecoder};

/// Normalized completion returned by every provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: u64,
    pub finish_reason: String,
}

/// Sampling parameters shared by all providers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// How a provider delivers incremental text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// Deltas arrive off the wire as they are generated.
    Native,
    /// The full response is fetched, then re-emitted word by word.
    Simulated,
}

/// Static capability set of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub streaming: StreamingMode,
    /// Runs on a discoverable local runtime.
    pub local: bool,
}

/// LLM client trait - swappable provider abstraction.
///
/// Clients are shared across agents, so they hold no per-call state beyond
/// their HTTP session.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider identifier used by the model catalog (e.g. "groq").
    fn id(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Model used when the requested one is not served by this provider.
    fn default_model(&self) -> &str;

    /// Whether the provider can currently take calls.
    async fn is_available(&self) -> bool {
        true
    }

    /// Models this provider can serve.
    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec![self.default_model().to_string()])
    }

    /// Send messages and get the complete response.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ModelResponse>;

    /// Stream the response as text fragments.
    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> ChunkStream;

    /// Release the HTTP session. Returns `true` only the first time.
    fn close(&self) -> bool;
}

/// `[{role, content}]` as used by OpenAI-compatible and Ollama APIs.
pub(crate) fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect()
}

#[cfg(test)]
pub use fake::FakeLlmClient;
