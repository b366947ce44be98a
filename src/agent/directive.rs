//! Tool directive parser.
//!
//! Models request tools by embedding fenced blocks in their reply:
//!
//! ````text
//! ```tool
//! {"name": "read_file", "arguments": {"path": "/tmp/a.txt"}}
//! ```
//! ````
//!
//! Extraction is best effort. A block whose body is not a JSON object with a
//! string `name` (and an object `arguments`, if present) is skipped.

use serde_json::{Map, Value};
use tracing::warn;

use super::message::ToolCall;

const FENCE_OPEN: &str = "```tool";
const FENCE_CLOSE: &str = "\n```";

/// Extract every well-formed directive from `text`, in order of appearance.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    candidates(text).into_iter().filter_map(decode).collect()
}

/// Split `text` into the raw bodies of ```` ```tool ```` fences.
fn candidates(text: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(FENCE_OPEN) {
        let after = &rest[start + FENCE_OPEN.len()..];

        let Some(newline) = after.find('\n') else {
            break;
        };

        // "```tools", "```tool_output" and friends are not directives
        if !after[..newline].trim().is_empty() {
            rest = after;
            continue;
        }

        let body = &after[newline + 1..];
        let Some(end) = body.find(FENCE_CLOSE) else {
            break;
        };

        bodies.push(&body[..end]);
        rest = &body[end + FENCE_CLOSE.len()..];
    }

    bodies
}

fn decode(body: &str) -> Option<ToolCall> {
    let value: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping malformed tool block: {}", e);
            return None;
        }
    };

    let Value::Object(mut object) = value else {
        warn!("Skipping tool block that is not a JSON object");
        return None;
    };

    let name = match object.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => {
            warn!("Skipping tool block without a name");
            return None;
        }
    };

    let arguments = match object.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args,
        Some(_) => {
            warn!("Skipping tool block for {} with non-object arguments", name);
            return None;
        }
    };

    Some(ToolCall::new(name, arguments))
}
