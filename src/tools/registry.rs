//! Tool registry - name → tool map with stable registration order

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::code::{PythonExecTool, ShellExecTool};
use super::filesystem::{ListDirectoryTool, PathPolicy, ReadFileTool, WriteFileTool};
use super::web::WebSearchTool;
use super::Tool;
use crate::config::ToolsConfig;
use crate::error::Error;
use crate::Result;

/// Tool definition rendered into the system prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Registry of the tools an agent may call.
///
/// Names are unique. Execution never fails: problems come back as text the
/// model can read.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a registry with the tools enabled in `config`
    pub fn with_defaults(config: &ToolsConfig) -> Result<Self> {
        let mut registry = Self::new();

        if config.enable_web_search {
            registry.register(WebSearchTool::new()?)?;
        }

        if config.enable_file_ops {
            let policy = PathPolicy::new(config.allowed_paths.clone());
            registry.register(ReadFileTool::new(policy.clone()))?;
            registry.register(WriteFileTool::new(policy.clone()))?;
            registry.register(ListDirectoryTool::new(policy))?;
        }

        if config.enable_code_execution {
            let timeout = std::time::Duration::from_secs(config.exec_timeout_secs);
            registry.register(PythonExecTool::new(timeout))?;
            registry.register(ShellExecTool::new(timeout))?;
        }

        debug!("Registered tools: {:?}", registry.tool_names());
        Ok(registry)
    }

    /// Register a tool; empty and duplicate names are rejected
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            return Err(Error::Tool("Tool name cannot be empty".to_string()));
        }
        if self.index.contains_key(&name) {
            return Err(Error::Tool(format!("Tool already registered: {}", name)));
        }

        self.index.insert(name, self.tools.len());
        self.tools.push(Box::new(tool));
        Ok(())
    }

    /// Tool definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool by name, folding every failure into the returned text
    pub async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> String {
        let Some(&slot) = self.index.get(name) else {
            warn!("Model requested unknown tool: {}", name);
            return format!("Unknown tool: {}", name);
        };

        match self.tools[slot].execute(Value::Object(arguments.clone())).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                format!("Error executing {}: {}", name, tool_error_text(&e))
            }
        }
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Executor errors read better without the "Tool error: " prefix.
fn tool_error_text(error: &Error) -> String {
    match error {
        Error::Tool(message) => message.clone(),
        other => other.to_string(),
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::DummyTool;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _params: Value) -> Result<String> {
            Err(Error::Tool("disk on fire".to_string()))
        }
    }

    fn dummy(name: &str, result: &str) -> DummyTool {
        DummyTool {
            name: name.to_string(),
            result: result.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(dummy("test_tool", "success")).unwrap();

        assert!(registry.has("test_tool"));
        let result = registry.execute("test_tool", &Map::new()).await;
        assert_eq!(result, "success");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_text() {
        let registry = ToolRegistry::new();
        let result = registry.execute("frobnicate", &Map::new()).await;
        assert_eq!(result, "Unknown tool: frobnicate");
    }

    #[tokio::test]
    async fn test_executor_error_is_text() {
        let mut registry = ToolRegistry::new();
        registry.register(BrokenTool).unwrap();
        let result = registry.execute("broken", &Map::new()).await;
        assert_eq!(result, "Error executing broken: disk on fire");
    }

    #[test]
    fn test_rejects_duplicate_and_empty_names() {
        let mut registry = ToolRegistry::new();
        registry.register(dummy("a", "1")).unwrap();

        let err = registry.register(dummy("a", "2")).unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert!(registry.register(dummy("  ", "x")).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_definitions_keep_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(dummy(name, "")).unwrap();
        }
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_with_defaults_respects_flags() {
        let mut config = ToolsConfig::default();
        let registry = ToolRegistry::with_defaults(&config).unwrap();
        assert_eq!(
            registry.tool_names(),
            vec![
                "web_search",
                "read_file",
                "write_file",
                "list_directory",
                "execute_python",
                "execute_shell"
            ]
        );

        config.enable_web_search = false;
        config.enable_code_execution = false;
        let registry = ToolRegistry::with_defaults(&config).unwrap();
        assert_eq!(registry.tool_names(), vec!["read_file", "write_file", "list_directory"]);
    }
}
