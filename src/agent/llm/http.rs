//! Shared HTTP session for provider clients.
//!
//! Each provider client owns one `HttpSession` for its lifetime. Clones share
//! the same underlying `reqwest::Client`; `close()` releases it exactly once,
//! after which every request fails.
//!
//! The session timeout bounds a batch request end to end. Streamed bodies
//! have no overall deadline; instead every read must complete within the
//! timeout, so a long generation that keeps producing output is never cut.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::Error;
use crate::Result;

#[derive(Clone)]
pub struct HttpSession {
    inner: Arc<Inner>,
}

struct Inner {
    provider: String,
    base_url: String,
    timeout: Duration,
    client: RwLock<Option<Client>>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpSession {
    /// Session authenticated with a Bearer token.
    pub fn bearer(provider: &str, base_url: &str, key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = json_headers();
        let value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| Error::Config(format!("Invalid {provider} API key: {e}")))?;
        headers.insert(header::AUTHORIZATION, value);
        Self::build(provider, base_url, headers, timeout)
    }

    /// Session without authentication (e.g. a local Ollama runtime).
    pub fn no_auth(provider: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        Self::build(provider, base_url, json_headers(), timeout)
    }

    fn build(provider: &str, base_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                provider: provider.to_string(),
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout,
                client: RwLock::new(Some(client)),
            }),
        })
    }

    pub fn provider(&self) -> &str {
        &self.inner.provider
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    fn client(&self) -> Result<Client> {
        let guard = self
            .inner
            .client
            .read()
            .map_err(|_| Error::Llm(format!("{} session lock poisoned", self.inner.provider)))?;
        guard
            .clone()
            .ok_or_else(|| Error::Llm(format!("{} session closed", self.inner.provider)))
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn json_request(&self, path: &str, body: &impl Serialize) -> Result<RequestBuilder> {
        if let Ok(body) = serde_json::to_string(body) {
            trace!("{} request: {}", self.inner.provider, body);
        }
        Ok(self.client()?.post(self.url(path)).json(body))
    }

    /// POST a JSON body without inspecting the status.
    pub async fn post_raw(&self, path: &str, body: &impl Serialize) -> Result<Response> {
        let request = self.json_request(path, body)?.timeout(self.inner.timeout);
        Ok(request.send().await?)
    }

    /// POST a JSON body; non-success statuses become errors.
    pub async fn post(&self, path: &str, body: &impl Serialize) -> Result<Response> {
        let response = self.post_raw(path, body).await?;
        self.check(response).await
    }

    /// POST a JSON body whose response is read incrementally.
    ///
    /// No overall deadline applies; read the body with [`Self::next_chunk`].
    pub async fn post_stream(&self, path: &str, body: &impl Serialize) -> Result<Response> {
        let send = self.json_request(path, body)?.send();
        let response = tokio::time::timeout(self.inner.timeout, send)
            .await
            .map_err(|_| self.stalled())??;
        self.check(response).await
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let request = self.client()?.get(self.url(path)).timeout(self.inner.timeout);
        let response = request.send().await?;
        self.check(response).await
    }

    /// Next piece of a streamed body, failing if none arrives within the
    /// session timeout.
    pub async fn next_chunk<S, B>(&self, body: &mut S) -> Result<Option<B>>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
    {
        match tokio::time::timeout(self.inner.timeout, body.next()).await {
            Ok(Some(chunk)) => Ok(Some(chunk?)),
            Ok(None) => Ok(None),
            Err(_) => Err(self.stalled()),
        }
    }

    fn stalled(&self) -> Error {
        Error::Llm(format!(
            "{} stream stalled: no data for {}s",
            self.inner.provider,
            self.inner.timeout.as_secs_f32()
        ))
    }

    /// Turn a non-success response into an `Error::Llm` carrying the body.
    pub async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Llm(format!(
            "{} API error ({}): {}",
            self.inner.provider, status, body
        )))
    }

    /// Release the underlying client. Returns `true` only on the first call.
    pub fn close(&self) -> bool {
        match self.inner.client.write() {
            Ok(mut guard) => {
                let released = guard.take().is_some();
                if released {
                    debug!("Closed {} session", self.inner.provider);
                }
                released
            }
            Err(_) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .client
            .read()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}
