//! Inference Client — OpenAI-compatible chat completion client.
//!
//! This module handles all communication with the hosted model endpoint:
//! - Non-streaming chat completions with tool definitions
//! - Conversion of conversation entries to OpenAI messages
//! - Response parsing into assistant replies and tool requests
//!
//! The client speaks the OpenAI Chat Completions API, so switching providers
//! is a config change, not a code change.

pub mod client;
pub mod errors;
pub mod response;
pub mod types;

// Re-exports for convenience
pub use client::{ChatModel, InferenceClient};
pub use errors::InferenceError;
pub use types::{ChatMessage, Role, ToolDefinition};
