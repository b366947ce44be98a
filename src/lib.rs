//! Gravity - autonomous multi-provider AI assistant
//!
//! This library provides the agent loop, the model orchestrator with
//! provider fallback, the tool registry, conversation storage, and the CLI
//! and WebSocket transports.

pub mod adapters;
pub mod agent;
pub mod config;
pub mod error;
pub mod memory;
pub mod tools;
pub mod ui;

pub use error::{Error, Result};
