//! Model orchestrator - routes a conversation to a provider and falls back
//! to the next one on failure.
//!
//! Resolution: a model listed in the catalog is tried on its owning provider
//! first; every other provider follows in preference order, each with a
//! best-effort model id (its own default unless the id is prefixed with the
//! provider name, as in `ollama/mistral`).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_stream::try_stream;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::agent::message::ChatMessage;
use crate::config::{Config, ModelInfo};
use crate::error::Error;
use crate::Result;

use super::stream::{self, ChunkStream};
use super::{ChatOptions, GroqClient, HuggingFaceClient, LlmClient, ModelResponse, OllamaClient};

/// A provider call that failed and triggered a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: String,
    pub model: String,
    pub error: String,
}

type Candidate = (Arc<dyn LlmClient>, String);

/// Holds the provider clients in preference order.
///
/// Clients are shared (`Arc`) and hold no per-call state, so one
/// orchestrator can serve any number of agents.
pub struct ModelOrchestrator {
    clients: Vec<Arc<dyn LlmClient>>,
    catalog: Vec<(String, ModelInfo)>,
    owners: HashMap<String, usize>,
    default_model: String,
    options: ChatOptions,
    failures: Arc<Mutex<Vec<ProviderFailure>>>,
}

impl ModelOrchestrator {
    pub fn new(
        clients: Vec<Arc<dyn LlmClient>>,
        catalog: Vec<(String, ModelInfo)>,
        default_model: impl Into<String>,
    ) -> Self {
        let owners = catalog
            .iter()
            .enumerate()
            .map(|(index, (id, _))| (id.clone(), index))
            .collect();

        Self {
            clients,
            catalog,
            owners,
            default_model: default_model.into(),
            options: ChatOptions::default(),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the clients named in `config.providers`, in that order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut clients: Vec<Arc<dyn LlmClient>> = Vec::with_capacity(config.providers.len());

        for name in &config.providers {
            let client: Arc<dyn LlmClient> = match name.as_str() {
                "groq" => Arc::new(GroqClient::new(&config.groq_api_key)?),
                "ollama" => Arc::new(OllamaClient::new(&config.ollama_url)?),
                "huggingface" => Arc::new(HuggingFaceClient::new(config.huggingface_api_key.as_deref())?),
                other => {
                    return Err(Error::Config(format!(
                        "Unknown provider: {other} (expected one of {:?})",
                        Self::known_providers()
                    )))
                }
            };
            clients.push(client);
        }

        if clients.is_empty() {
            return Err(Error::Config("At least one provider is required".to_string()));
        }

        let options = ChatOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        Ok(Self::new(clients, crate::config::default_catalog(), config.default_model.clone())
            .with_options(options))
    }

    /// Provider names accepted in `config.providers`.
    pub fn known_providers() -> &'static [&'static str] {
        &["groq", "ollama", "huggingface"]
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn catalog(&self) -> &[(String, ModelInfo)] {
        &self.catalog
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.id()).collect()
    }

    /// Failures recorded so far, oldest first.
    pub fn failures(&self) -> Vec<ProviderFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }

    fn model_info(&self, model: &str) -> Option<&ModelInfo> {
        self.owners.get(model).map(|&index| &self.catalog[index].1)
    }

    /// Ordered (client, model id) pairs to try for `model`.
    fn resolve(&self, model: Option<&str>) -> Vec<Candidate> {
        let requested = model.unwrap_or(&self.default_model);
        let info = self.model_info(requested);
        let owner = info.map(|i| i.provider.as_str());

        let mut candidates: Vec<Candidate> = Vec::with_capacity(self.clients.len());

        if let (Some(owner), Some(info)) = (owner, info) {
            if let Some(client) = self.clients.iter().find(|c| c.id() == owner) {
                candidates.push((client.clone(), info.name.clone()));
            }
        }

        for client in &self.clients {
            if Some(client.id()) == owner {
                continue;
            }
            let prefix = format!("{}/", client.id());
            let mapped = requested
                .strip_prefix(&prefix)
                .unwrap_or_else(|| client.default_model())
                .to_string();
            candidates.push((client.clone(), mapped));
        }

        candidates
    }

    /// Send a chat request to the best available provider.
    pub async fn chat(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<ModelResponse> {
        for (client, model) in self.resolve(model) {
            if !client.is_available().await {
                debug!("Skipping unavailable provider {}", client.id());
                continue;
            }

            match client.chat(messages, &model, &self.options).await {
                Ok(response) => {
                    debug!("{} answered with {} tokens", client.id(), response.tokens_used);
                    return Ok(response);
                }
                Err(e) => record_failure(&self.failures, client.id(), &model, &e),
            }
        }

        Err(Error::NoProvider)
    }

    /// Stream a chat response from the best available provider.
    ///
    /// A provider that fails before producing its first chunk is replaced by
    /// the next one. Once text has been relayed, a failure ends the stream.
    pub fn chat_stream(&self, messages: &[ChatMessage], model: Option<&str>) -> ChunkStream {
        let candidates = self.resolve(model);
        let messages = messages.to_vec();
        let options = self.options;
        let failures = self.failures.clone();

        stream::boxed(try_stream! {
            for (client, model) in candidates {
                if !client.is_available().await {
                    debug!("Skipping unavailable provider {}", client.id());
                    continue;
                }

                let mut chunks = client.chat_stream(&messages, &model, &options);
                let mut started = false;
                let mut failed = None;

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(text) => {
                            started = true;
                            yield text;
                        }
                        Err(e) if !started => {
                            failed = Some(e);
                            break;
                        }
                        Err(e) => {
                            warn!("{} stream broke after output: {}", client.id(), e);
                            Err::<(), Error>(e)?;
                        }
                    }
                }

                match failed {
                    Some(e) => record_failure(&failures, client.id(), &model, &e),
                    None => return,
                }
            }

            Err::<(), Error>(Error::NoProvider)?;
        })
    }

    /// Availability of every provider, in preference order.
    pub async fn provider_status(&self) -> Vec<(String, bool)> {
        let mut status = Vec::with_capacity(self.clients.len());
        for client in &self.clients {
            status.push((client.id().to_string(), client.is_available().await));
        }
        status
    }

    /// Models each provider can serve, keyed by provider id.
    pub async fn available_models(&self) -> BTreeMap<String, Vec<String>> {
        let mut models = BTreeMap::new();

        for client in &self.clients {
            let listed = if client.capabilities().local {
                client.list_models().await.unwrap_or_default()
            } else {
                let from_catalog: Vec<String> = self
                    .catalog
                    .iter()
                    .filter(|(_, info)| info.provider == client.id())
                    .map(|(id, _)| id.clone())
                    .collect();
                if from_catalog.is_empty() {
                    client.list_models().await.unwrap_or_default()
                } else {
                    from_catalog
                }
            };

            if !listed.is_empty() {
                models.insert(client.id().to_string(), listed);
            }
        }

        models
    }

    /// Release every provider session. Returns how many were released.
    pub fn close(&self) -> usize {
        let closed = self.clients.iter().filter(|c| c.close()).count();
        info!("Closed {} provider session(s)", closed);
        closed
    }
}

fn record_failure(failures: &Mutex<Vec<ProviderFailure>>, provider: &str, model: &str, error: &Error) {
    warn!("{} error with model {}: {}, trying fallback...", provider, model, error);
    if let Ok(mut failures) = failures.lock() {
        failures.push(ProviderFailure {
            provider: provider.to_string(),
            model: model.to_string(),
            error: error.to_string(),
        });
    }
}

impl std::fmt::Debug for ModelOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelOrchestrator")
            .field("providers", &self.provider_ids())
            .field("default_model", &self.default_model)
            .finish()
    }
}
