//! Agent loop - bounded think/act cycle exposed as an event stream
//!
//! One call to [`Agent::chat`] is one turn. The returned stream borrows the
//! agent mutably, so a second turn cannot start until the first one has
//! been consumed or dropped.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tools::ToolRegistry;
use crate::Result;

use super::context::Context;
use super::directive::parse_tool_calls;
use super::event::{AgentEvent, AgentStatus};
use super::llm::ModelOrchestrator;
use super::message::ChatMessage;

/// An assistant with its own conversation, sharing providers and tools.
pub struct Agent {
    orchestrator: Arc<ModelOrchestrator>,
    tools: Arc<ToolRegistry>,
    context: Context,
    conversation: Vec<ChatMessage>,
    status: AgentStatus,
    max_iterations: usize,
}

impl Agent {
    /// Create an agent. A ceiling of zero is raised to one model call.
    pub fn new(orchestrator: Arc<ModelOrchestrator>, tools: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        let context = Context::new(&tools.definitions());
        Self {
            orchestrator,
            tools,
            context,
            conversation: Vec::new(),
            status: AgentStatus::Idle,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    /// The persisted conversation: user messages and one assistant message
    /// per completed turn.
    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn clear_conversation(&mut self) {
        self.conversation.clear();
    }

    /// Replace the conversation, e.g. with history loaded from a store.
    pub fn restore(&mut self, history: Vec<ChatMessage>) {
        self.conversation = history;
    }

    pub fn orchestrator(&self) -> &Arc<ModelOrchestrator> {
        &self.orchestrator
    }

    /// Run one turn, yielding events as they happen.
    ///
    /// A provider failure ends the stream with `Err`; the user message stays
    /// in the conversation and no assistant message is added.
    pub fn chat<'a>(
        &'a mut self,
        message: &str,
        model: Option<&str>,
    ) -> impl Stream<Item = Result<AgentEvent>> + Send + 'a {
        let message = message.to_string();
        let model = model.map(str::to_string);

        try_stream! {
            info!("Starting turn: {} chars", message.len());
            self.conversation.push(ChatMessage::user(message));
            let mut messages = self.context.build_messages(&self.conversation);

            let mut iteration = 0;
            let mut full_response = String::new();

            while iteration < self.max_iterations {
                iteration += 1;
                self.status = AgentStatus::Thinking;
                yield AgentEvent::Status { status: AgentStatus::Thinking, iteration };

                let mut chunks = self.orchestrator.chat_stream(&messages, model.as_deref());
                let mut current = String::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            warn!("Model call failed on iteration {}: {}", iteration, e);
                            self.status = AgentStatus::Idle;
                            Err::<String, Error>(e)?
                        }
                    };
                    current.push_str(&chunk);
                    yield AgentEvent::Chunk { content: chunk };
                }
                full_response.push_str(&current);

                let mut calls = parse_tool_calls(&current);
                if calls.is_empty() {
                    break;
                }

                debug!("Iteration {}: {} tool call(s)", iteration, calls.len());
                self.status = AgentStatus::ToolCalling;
                yield AgentEvent::Status { status: AgentStatus::ToolCalling, iteration };

                let mut results = Vec::with_capacity(calls.len());
                for call in calls.iter_mut() {
                    yield AgentEvent::ToolCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    };

                    let output = self.tools.execute(&call.name, &call.arguments).await;
                    let result = call.complete(output).to_string();
                    results.push(format!("Tool '{}' result:\n{}", call.name, result));

                    yield AgentEvent::ToolResult { name: call.name.clone(), result };
                }

                messages.push(ChatMessage::assistant(current));
                messages.push(ChatMessage::user(format!(
                    "Tool results:\n\n{}\n\nContinue your answer.",
                    results.join("\n\n")
                )));
            }

            self.status = AgentStatus::Responding;
            yield AgentEvent::Status { status: AgentStatus::Responding, iteration };

            self.conversation.push(ChatMessage::assistant(full_response.clone()));
            self.status = AgentStatus::Idle;
            info!("Turn finished after {} iteration(s)", iteration);

            yield AgentEvent::Done { full_response };
        }
    }

    /// One non-streaming model call without tools.
    pub async fn simple_chat(&mut self, message: &str, model: Option<&str>) -> Result<String> {
        self.conversation.push(ChatMessage::user(message));
        let messages = self.context.build_simple_messages(&self.conversation);

        let response = self.orchestrator.chat(&messages, model).await?;
        self.conversation.push(ChatMessage::assistant(response.content.clone()));
        Ok(response.content)
    }

    /// Shut down the provider sessions behind this agent.
    pub fn close(&self) -> usize {
        self.orchestrator.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FakeLlmClient, LlmClient};
    use crate::agent::message::Role;
    use crate::tools::{DummyTool, Tool};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Records each invocation as "name:arguments".
    struct RecordingTool {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "Records calls"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"n": {"type": "integer"}}})
        }
        async fn execute(&self, params: Value) -> Result<String> {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, params));
            Ok(format!("{} ok", self.name))
        }
    }

    fn directive(name: &str, arguments: Value) -> String {
        format!("```tool\n{}\n```", json!({"name": name, "arguments": arguments}))
    }

    fn agent_with(client: &FakeLlmClient, tools: ToolRegistry, max_iterations: usize) -> Agent {
        let orchestrator = ModelOrchestrator::new(
            vec![Arc::new(client.clone()) as Arc<dyn LlmClient>],
            vec![],
            "fake-model",
        );
        Agent::new(Arc::new(orchestrator), Arc::new(tools), max_iterations)
    }

    fn recording_registry(names: &[&str]) -> (ToolRegistry, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        for name in names {
            registry
                .register(RecordingTool {
                    name: name.to_string(),
                    log: log.clone(),
                })
                .unwrap();
        }
        (registry, log)
    }

    async fn run_turn(agent: &mut Agent, message: &str) -> Result<Vec<AgentEvent>> {
        let stream = agent.chat(message, None);
        tokio::pin!(stream);

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }
        Ok(events)
    }

    fn tool_calls(events: &[AgentEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCall { .. }))
            .count()
    }

    fn done_text(events: &[AgentEvent]) -> &str {
        match events.last() {
            Some(AgentEvent::Done { full_response }) => full_response,
            other => panic!("turn did not end with done: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_plain_answer_is_one_model_call() {
        let client = FakeLlmClient::new("fake", vec!["Hello, human!"]);
        let mut agent = agent_with(&client, ToolRegistry::new(), 10);

        let events = tokio_test::assert_ok!(run_turn(&mut agent, "Hi there").await);

        assert_eq!(client.calls(), 1);
        assert_eq!(
            events.first(),
            Some(&AgentEvent::Status { status: AgentStatus::Thinking, iteration: 1 })
        );
        assert_eq!(
            events[events.len() - 2],
            AgentEvent::Status { status: AgentStatus::Responding, iteration: 1 }
        );
        assert_eq!(done_text(&events), "Hello, human!");

        let chunks: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Chunk { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, "Hello, human!");

        assert_eq!(
            agent.conversation(),
            &[ChatMessage::user("Hi there"), ChatMessage::assistant("Hello, human!")]
        );
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_k_calls_and_k_minus_one_tool_rounds() {
        let first = directive("echo", json!({"n": 1}));
        let second = directive("echo", json!({"n": 2}));
        let client = FakeLlmClient::new("fake", vec![first.as_str(), second.as_str(), "final"]);
        let (registry, log) = recording_registry(&["echo"]);
        let mut agent = agent_with(&client, registry, 10);

        let events = run_turn(&mut agent, "go").await.unwrap();

        assert_eq!(client.calls(), 3);
        assert_eq!(log.lock().unwrap().len(), 2);

        let phases: Vec<AgentStatus> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Status { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                AgentStatus::Thinking,
                AgentStatus::ToolCalling,
                AgentStatus::Thinking,
                AgentStatus::ToolCalling,
                AgentStatus::Thinking,
                AgentStatus::Responding,
            ]
        );
    }

    #[tokio::test]
    async fn test_iteration_ceiling_terminates() {
        let reply = directive("echo", json!({}));
        let client = FakeLlmClient::new("fake", vec![reply.as_str(); 8]);
        let (registry, log) = recording_registry(&["echo"]);
        let mut agent = agent_with(&client, registry, 3);

        let events = run_turn(&mut agent, "loop forever").await.unwrap();

        assert_eq!(client.calls(), 3);
        assert_eq!(log.lock().unwrap().len(), 3);
        assert!(events.iter().all(|e| match e {
            AgentEvent::Status { iteration, .. } => *iteration <= 3,
            _ => true,
        }));
        assert_eq!(done_text(&events), reply.repeat(3));
        assert_eq!(agent.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_tools_run_in_textual_order() {
        let reply = format!(
            "First b, then a.\n{}\n{}\n",
            directive("b", json!({"n": 1})),
            directive("a", json!({"n": 2}))
        );
        let client = FakeLlmClient::new("fake", vec![reply.as_str(), "ok"]);
        let (registry, log) = recording_registry(&["a", "b"]);
        let mut agent = agent_with(&client, registry, 10);

        run_turn(&mut agent, "order").await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![r#"b:{"n":1}"#, r#"a:{"n":2}"#]);
    }

    #[tokio::test]
    async fn test_malformed_directive_is_skipped() {
        let client = FakeLlmClient::new("fake", vec!["```tool\n{not json}\n```"]);
        let (registry, log) = recording_registry(&["echo"]);
        let mut agent = agent_with(&client, registry, 10);

        let events = run_turn(&mut agent, "hi").await.unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(tool_calls(&events), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_then_read_end_to_end() {
        let list = directive("list_directory", json!({"path": "/tmp"}));
        let read = directive("read_file", json!({"path": "/tmp/a.txt"}));
        let client = FakeLlmClient::new("fake", vec![list.as_str(), read.as_str(), "Done."]);

        let mut registry = ToolRegistry::new();
        registry
            .register(DummyTool {
                name: "list_directory".to_string(),
                result: "[FILE] a.txt\n[FILE] b.txt".to_string(),
            })
            .unwrap();
        registry
            .register(DummyTool {
                name: "read_file".to_string(),
                result: "alpha".to_string(),
            })
            .unwrap();
        let mut agent = agent_with(&client, registry, 10);

        let events = run_turn(&mut agent, "list files in /tmp then read the first one")
            .await
            .unwrap();

        assert_eq!(client.calls(), 3);
        let pairs: Vec<(&str, &str)> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolResult { name, result } => Some((name.as_str(), result.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            pairs,
            vec![("list_directory", "[FILE] a.txt\n[FILE] b.txt"), ("read_file", "alpha")]
        );
        assert_eq!(tool_calls(&events), 2);
        assert!(done_text(&events).ends_with("Done."));

        // The third call sees both synthetic round trips.
        let prompts = client.prompts();
        let third = &prompts[2];
        assert_eq!(third.len(), 6);
        assert_eq!(third[4], ChatMessage::assistant(read.clone()));
        assert_eq!(
            third[5].content,
            "Tool results:\n\nTool 'read_file' result:\nalpha\n\nContinue your answer."
        );

        // Only the user message and the final answer are persisted.
        assert_eq!(agent.conversation().len(), 2);
        assert_eq!(agent.conversation()[1].role, Role::Assistant);
        assert_eq!(agent.conversation()[1].content, format!("{}{}Done.", list, read));
    }

    #[tokio::test]
    async fn test_tool_failure_is_folded_into_prompt() {
        let reply = directive("missing_tool", json!({}));
        let client = FakeLlmClient::new("fake", vec![reply.as_str(), "Sorry."]);
        let mut agent = agent_with(&client, ToolRegistry::new(), 10);

        let events = run_turn(&mut agent, "try it").await.unwrap();

        assert!(events.contains(&AgentEvent::ToolResult {
            name: "missing_tool".to_string(),
            result: "Unknown tool: missing_tool".to_string(),
        }));
        let prompts = client.prompts();
        assert!(prompts[1]
            .last()
            .unwrap()
            .content
            .contains("Tool 'missing_tool' result:\nUnknown tool: missing_tool"));
    }

    #[tokio::test]
    async fn test_provider_failure_ends_turn() {
        let client = FakeLlmClient::failing("fake");
        let mut agent = agent_with(&client, ToolRegistry::new(), 10);

        let err = run_turn(&mut agent, "hello?").await.unwrap_err();

        assert!(matches!(err, Error::NoProvider));
        assert_eq!(agent.conversation(), &[ChatMessage::user("hello?")]);
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_history_carries_across_turns() {
        let client = FakeLlmClient::new("fake", vec!["one", "two"]);
        let mut agent = agent_with(&client, ToolRegistry::new(), 10);

        run_turn(&mut agent, "first").await.unwrap();
        run_turn(&mut agent, "second").await.unwrap();

        let second_prompt = &client.prompts()[1];
        assert_eq!(second_prompt[0].role, Role::System);
        assert_eq!(
            second_prompt[1..],
            [
                ChatMessage::user("first"),
                ChatMessage::assistant("one"),
                ChatMessage::user("second")
            ]
        );

        agent.clear_conversation();
        assert!(agent.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_simple_chat() {
        let client = FakeLlmClient::new("fake", vec!["```tool\n{\"name\":\"x\"}\n```"]);
        let (registry, log) = recording_registry(&["x"]);
        let mut agent = agent_with(&client, registry, 10);

        let reply = agent.simple_chat("plain please", None).await.unwrap();

        assert!(reply.starts_with("```tool"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(agent.conversation().len(), 2);
        assert!(!client.prompts()[0][0].content.contains("```tool"));
    }

    #[tokio::test]
    async fn test_close_shuts_down_providers() {
        let client = FakeLlmClient::new("fake", vec![]);
        let agent = agent_with(&client, ToolRegistry::new(), 10);

        assert_eq!(agent.close(), 1);
        assert!(client.is_closed());
    }
}
