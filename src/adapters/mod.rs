//! Adapters module - transports in front of the agent.
//!
//! # Supported Channels
//!
//! - **CLI** - interactive REPL and one-shot messages
//! - **WebSocket** - JSON chat gateway streaming agent events
//!
//! Both keep one [`Agent`](crate::agent::Agent) per session and record each
//! turn in a [`ConversationStore`](crate::memory::ConversationStore).

pub mod cli;
pub mod websocket;

/// Channel registry - metadata about available channels.
pub struct ChannelRegistry;

impl ChannelRegistry {
    /// List all available channel names.
    pub fn available() -> &'static [&'static str] {
        &["cli", "websocket"]
    }

    /// Get a human-readable description of a channel.
    pub fn description(name: &str) -> &'static str {
        match name {
            "cli" => "Interactive command line interface",
            "websocket" => "WebSocket chat gateway (gravity serve)",
            _ => "Unknown channel",
        }
    }
}

/// Cut `text` to at most `max` characters for display.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 2), "he");
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("", 0), "");
    }

    #[test]
    fn test_channel_descriptions() {
        for name in ChannelRegistry::available() {
            assert_ne!(ChannelRegistry::description(name), "Unknown channel");
        }
    }
}
