//! Web search tool backed by the DuckDuckGo HTML endpoint (no API key)

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{required_str, Tool};
use crate::error::Error;
use crate::Result;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const DEFAULT_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    link: Regex,
    snippet: Regex,
    tag: Regex,
}

impl WebSearchTool {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            link: compile(r#"<a rel="nofollow" class="result__a" href="([^"]+)"[^>]*>(.*?)</a>"#)?,
            snippet: compile(r#"<a class="result__snippet"[^>]*>(.*?)</a>"#)?,
            tag: compile(r"<[^>]+>")?,
        })
    }

    /// Run a search; transport failures yield no results.
    pub async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult> {
        match self.fetch(query).await {
            Ok(html) => self.parse_results(&html, num_results),
            Err(e) => {
                warn!("Search error: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    fn parse_results(&self, html: &str, num_results: usize) -> Vec<SearchResult> {
        let snippets: Vec<String> = self
            .snippet
            .captures_iter(html)
            .map(|c| self.clean(&c[1]))
            .collect();

        let results: Vec<SearchResult> = self
            .link
            .captures_iter(html)
            .take(num_results)
            .enumerate()
            .map(|(i, c)| SearchResult {
                title: self.clean(&c[2]),
                url: decode_entities(&c[1]),
                snippet: snippets.get(i).cloned().unwrap_or_default(),
            })
            .collect();

        debug!("Parsed {} search results", results.len());
        results
    }

    fn clean(&self, fragment: &str) -> String {
        decode_entities(self.tag.replace_all(fragment, "").trim())
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Tool(format!("Invalid pattern: {}", e)))
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Numbered list the model can read.
pub fn format_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for: {}", query);
    }

    let mut text = format!("Search results for: {}\n\n", query);
    for (i, r) in results.iter().enumerate() {
        text.push_str(&format!("{}. **{}**\n   URL: {}\n   {}\n\n", i + 1, r.title, r.url, r.snippet));
    }
    text
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Use this when you need current information or facts you don't know."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)",
                    "default": DEFAULT_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let query = required_str(&params, "query")?;
        let num_results = params
            .get("num_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_RESULTS);

        let results = self.search(query, num_results).await;
        Ok(format_results(query, &results))
    }
}
