//! Agent module - core agent logic.
//!
//! This module contains:
//! - Message and tool-call types
//! - LLM clients and the model orchestrator
//! - The directive parser that finds tool calls in model output
//! - The agent loop, exposed as a stream of [`AgentEvent`]s
//!
//! # Adding a New LLM Provider
//!
//! See [`llm`] for instructions.

mod context;
mod directive;
mod event;
mod loop_impl;
mod message;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use context::Context;
pub use directive::parse_tool_calls;
pub use event::{AgentEvent, AgentStatus};
pub use llm::{LlmClient, ModelOrchestrator, ModelResponse, ProviderFailure};
pub use loop_impl::Agent;
pub use message::{ChatMessage, Role, ToolCall};
