//! HuggingFace Inference API client.
//!
//! The free inference endpoint has no usable incremental delivery, so
//! streaming is simulated: the whole response is fetched and re-emitted word
//! by word.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::message::{ChatMessage, Role};
use crate::error::Error;
use crate::Result;

use super::http::HttpSession;
use super::stream::{self, split_words, ChunkStream};
use super::{ChatOptions, LlmClient, ModelResponse, ProviderCapabilities, StreamingMode};

const HF_API_URL: &str = "https://api-inference.huggingface.co/models";

/// Free models tried in order until one answers.
pub const FREE_MODELS: [&str; 4] = [
    "HuggingFaceH4/zephyr-7b-beta",
    "microsoft/Phi-3-mini-4k-instruct",
    "google/gemma-1.1-7b-it",
    "mistralai/Mistral-7B-Instruct-v0.2",
];

#[derive(Clone)]
pub struct HuggingFaceClient {
    session: HttpSession,
}

impl HuggingFaceClient {
    /// Create a client; the token is optional for the free tier.
    pub fn new(api_key: Option<&str>) -> Result<Self> {
        Self::with_base_url(api_key, HF_API_URL)
    }

    pub fn with_base_url(api_key: Option<&str>, base_url: &str) -> Result<Self> {
        let timeout = Duration::from_secs(120);
        let session = match api_key.filter(|k| !k.is_empty()) {
            Some(key) => HttpSession::bearer("huggingface", base_url, key, timeout)?,
            None => HttpSession::no_auth("huggingface", base_url, timeout)?,
        };
        Ok(Self { session })
    }

    /// Requested model first, then the remaining free models.
    fn candidates(model: &str) -> Vec<&str> {
        let mut models = vec![model];
        models.extend(FREE_MODELS.iter().copied().filter(|m| *m != model));
        models
    }

    async fn generate(&self, model: &str, prompt: &str, options: &ChatOptions) -> Result<Option<String>> {
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": options.max_tokens,
                "temperature": options.temperature,
                "return_full_text": false,
                "do_sample": true
            }
        });

        let response = self.session.post_raw(&format!("/{model}"), &body).await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            debug!("HuggingFace model {} is loading", model);
            return Ok(None);
        }

        let data: Value = self.session.check(response).await?.json().await?;
        Ok(Some(generated_text(data)))
    }
}

/// Render messages with instruction-tuned chat markers.
pub fn format_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let marker = match message.role {
            Role::System => "<|system|>",
            Role::User => "<|user|>",
            Role::Assistant => "<|assistant|>",
        };
        prompt.push_str(marker);
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("<|assistant|>\n");
    prompt
}

/// Extract `generated_text` from either the list or the object response shape.
fn generated_text(data: Value) -> String {
    let item = match data {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    };
    match item.get("generated_text").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => item.to_string(),
    }
}

#[async_trait]
impl LlmClient for HuggingFaceClient {
    fn id(&self) -> &str {
        "huggingface"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: StreamingMode::Simulated,
            local: false,
        }
    }

    fn default_model(&self) -> &str {
        FREE_MODELS[0]
    }

    async fn is_available(&self) -> bool {
        !self.session.is_closed()
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(FREE_MODELS.iter().map(|m| m.to_string()).collect())
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> Result<ModelResponse> {
        let prompt = format_prompt(messages);

        for candidate in Self::candidates(model) {
            debug!("Trying HuggingFace model: {}", candidate);
            match self.generate(candidate, &prompt, options).await {
                Ok(Some(content)) => {
                    return Ok(ModelResponse {
                        tokens_used: content.split_whitespace().count() as u64,
                        content,
                        model: candidate.to_string(),
                        finish_reason: "stop".to_string(),
                    });
                }
                Ok(None) => continue,
                Err(e) => warn!("HuggingFace model {} failed: {}", candidate, e),
            }
        }

        Err(Error::Llm("All HuggingFace models failed".to_string()))
    }

    fn chat_stream(
        &self,
        messages: &[ChatMessage],
        model: &str,
        options: &ChatOptions,
    ) -> ChunkStream {
        let client = self.clone();
        let messages = messages.to_vec();
        let model = model.to_string();
        let options = *options;

        stream::boxed(try_stream! {
            let response = client.chat(&messages, &model, &options).await?;
            for word in split_words(&response.content) {
                yield word;
            }
        })
    }

    fn close(&self) -> bool {
        self.session.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::mock_server::{MockServer, Reply};
    use futures_util::StreamExt;

    /// The first free model is still loading; the second one answers.
    async fn loading_then_ready() -> MockServer {
        MockServer::start(|request| {
            if request.path == format!("/{}", FREE_MODELS[0]) {
                Reply::json(503, r#"{"error":"Model is currently loading","estimated_time":20.0}"#)
            } else {
                Reply::json(200, r#"[{"generated_text":"Hi there,  friend.\nHow can I help?"}]"#)
            }
        })
        .await
    }

    #[test]
    fn test_format_prompt() {
        let prompt = format_prompt(&[
            ChatMessage::system("Be brief."),
            ChatMessage::user("Hi"),
            ChatMessage::assistant("Hello"),
        ]);
        assert_eq!(
            prompt,
            "<|system|>\nBe brief.\n<|user|>\nHi\n<|assistant|>\nHello\n<|assistant|>\n"
        );
    }

    #[test]
    fn test_generated_text_shapes() {
        assert_eq!(generated_text(json!([{"generated_text": "a b"}])), "a b");
        assert_eq!(generated_text(json!({"generated_text": "c"})), "c");
        assert_eq!(generated_text(json!({"error": "x"})), r#"{"error":"x"}"#);
    }

    #[test]
    fn test_candidates_start_with_requested() {
        let models = HuggingFaceClient::candidates("google/gemma-1.1-7b-it");
        assert_eq!(models[0], "google/gemma-1.1-7b-it");
        assert_eq!(models.len(), FREE_MODELS.len());

        let models = HuggingFaceClient::candidates("custom/model");
        assert_eq!(models.len(), FREE_MODELS.len() + 1);
    }

    #[tokio::test]
    async fn test_closed_client_fails_every_model() {
        let client = HuggingFaceClient::new(None).unwrap();
        assert!(client.close());
        assert!(!client.is_available().await);

        let err = client
            .chat(&[ChatMessage::user("hi")], FREE_MODELS[0], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("All HuggingFace models failed"));
    }

    #[tokio::test]
    async fn test_loading_model_is_skipped() {
        let server = loading_then_ready().await;
        let client = HuggingFaceClient::with_base_url(None, server.url()).unwrap();

        let response = client
            .chat(&[ChatMessage::user("Hi")], FREE_MODELS[0], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "Hi there,  friend.\nHow can I help?");
        assert_eq!(response.model, FREE_MODELS[1]);
        assert_eq!(
            server.paths(),
            vec![format!("/{}", FREE_MODELS[0]), format!("/{}", FREE_MODELS[1])]
        );

        let body: Value = serde_json::from_str(&server.requests()[0].body).unwrap();
        assert_eq!(body["inputs"], "<|user|>\nHi\n<|assistant|>\n");
    }

    #[tokio::test]
    async fn test_simulated_stream_concatenates_to_full_response() {
        let server = loading_then_ready().await;
        let client = HuggingFaceClient::with_base_url(Some("hf_test"), server.url()).unwrap();
        let messages = [ChatMessage::user("Hi")];
        let options = ChatOptions::default();

        let full = client.chat(&messages, FREE_MODELS[1], &options).await.unwrap();
        let chunks: Vec<String> = client
            .chat_stream(&messages, FREE_MODELS[1], &options)
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks, vec!["Hi ", "there,  ", "friend.\n", "How ", "can ", "I ", "help?"]);
        assert_eq!(chunks.concat(), full.content);
    }

    #[tokio::test]
    async fn test_every_model_failing_is_an_error() {
        let server = MockServer::start(|_| Reply::json(500, r#"{"error":"internal"}"#)).await;
        let client = HuggingFaceClient::with_base_url(None, server.url()).unwrap();

        let err = client
            .chat(&[ChatMessage::user("Hi")], FREE_MODELS[0], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("All HuggingFace models failed"));
        assert_eq!(server.paths().len(), FREE_MODELS.len());
    }
}
