//! Context builder for agent prompts.
//!
//! The system prompt is rendered once from the registered tool definitions
//! and reused for every model call of the agent's lifetime.

use serde_json::Value;

use crate::tools::ToolDefinition;

use super::message::ChatMessage;

const SIMPLE_PROMPT: &str = "You are Gravity, a helpful and precise AI assistant.";

/// Prompt material shared by every turn of one agent.
#[derive(Debug, Clone)]
pub struct Context {
    system_prompt: String,
}

impl Context {
    /// Render the system prompt for the given tools.
    pub fn new(tools: &[ToolDefinition]) -> Self {
        Self {
            system_prompt: render_system_prompt(tools),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// `[system prompt, ..history]` for a tool-enabled turn.
    pub fn build_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        with_system(&self.system_prompt, history)
    }

    /// `[plain system prompt, ..history]` for a turn without tools.
    pub fn build_simple_messages(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        with_system(SIMPLE_PROMPT, history)
    }
}

fn with_system(prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(prompt));
    messages.extend(history.iter().cloned());
    messages
}

fn render_system_prompt(tools: &[ToolDefinition]) -> String {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M (%A)");

    let mut prompt = format!(
        "# Gravity\n\n\
         You are Gravity, an autonomous AI assistant. You solve problems proactively, \
         explain your reasoning clearly and use tools when they help.\n\n\
         ## Current Time\n{}\n",
        now
    );

    if tools.is_empty() {
        prompt.push_str("\nNo tools are available. Answer directly.\n");
        return prompt;
    }

    prompt.push_str("\n## Tools\nYou have access to these tools:\n\n");
    for (i, tool) in tools.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. **{}({})**: {}\n",
            i + 1,
            tool.name,
            signature(tool).join(", "),
            tool.description
        ));
    }

    prompt.push_str(
        "\nTo use a tool, put this EXACT format in your answer:\n\
         ```tool\n\
         {\"name\": \"tool_name\", \"arguments\": {\"arg1\": \"value1\"}}\n\
         ```\n\n\
         You may call several tools in one answer. After you receive the results, \
         continue your reasoning. When you no longer need tools, answer the user \
         completely without any tool block.\n",
    );

    prompt
}

/// `name: type` per parameter: required ones in their declared order, then
/// optional ones marked with `?`.
fn signature(tool: &ToolDefinition) -> Vec<String> {
    let Some(properties) = tool.parameters.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = tool
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let describe = |name: &str, optional: bool| {
        let marker = if optional { "?" } else { "" };
        match properties.get(name).and_then(|p| p.get("type")).and_then(Value::as_str) {
            Some(kind) => format!("{}{}: {}", name, marker, kind),
            None => format!("{}{}", name, marker),
        }
    };

    let mut params: Vec<String> = required
        .iter()
        .filter(|name| properties.contains_key(**name))
        .map(|name| describe(name, false))
        .collect();
    params.extend(
        properties
            .keys()
            .filter(|name| !required.contains(&name.as_str()))
            .map(|name| describe(name, true)),
    );
    params
}
