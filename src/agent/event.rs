//! Events emitted by the agent loop

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Agent state within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    ToolCalling,
    Responding,
}

/// One observable state transition of a turn.
///
/// Consumers can rebuild the turn text from `Chunk`s and the tool activity
/// from `ToolCall`/`ToolResult` pairs without replaying history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Status {
        status: AgentStatus,
        iteration: usize,
    },
    Chunk {
        content: String,
    },
    ToolCall {
        name: String,
        arguments: Map<String, Value>,
    },
    ToolResult {
        name: String,
        result: String,
    },
    Done {
        full_response: String,
    },
    Error {
        message: String,
    },
}

impl From<&Error> for AgentEvent {
    /// A failed turn, as reported to the consumer of the event stream.
    fn from(error: &Error) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }
}
