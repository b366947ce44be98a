//! Tools module - agent capabilities
//!
//! Tools are external actions the agent can take: searching the web, reading
//! and writing files, and running code. The agent invokes them through
//! ```` ```tool ```` directives and gets their results back as text.

mod code;
mod filesystem;
mod registry;
mod web;

pub use code::{PythonExecTool, ShellExecTool};
pub use filesystem::{ListDirectoryTool, PathPolicy, ReadFileTool, WriteFileTool};
pub use registry::{ToolDefinition, ToolRegistry};
pub use web::WebSearchTool;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in directives
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<String>;

    /// Convert to tool definition for the system prompt
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Fetch a required string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Tool(format!("Missing '{}' parameter", key)))
}

/// Dummy tool for testing
pub struct DummyTool {
    pub name: String,
    pub result: String,
}

#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Dummy tool for testing"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _params: Value) -> Result<String> {
        Ok(self.result.clone())
    }
}
