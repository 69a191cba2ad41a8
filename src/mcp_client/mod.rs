//! MCP Client — JSON-RPC over stdio transport for MCP server management.
//!
//! This module handles:
//! - Spawning MCP server child processes and the initialize handshake
//! - JSON-RPC 2.0 communication over process stdio
//! - Tool aggregation across all servers under bare names
//! - Tool call validation, dispatch and result text extraction
//!
//! The database is only ever reached through these servers; the agent never
//! opens a SQL connection itself.

pub mod client;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::McpClient;
pub use errors::McpError;
pub use registry::ToolRegistry;
pub use types::{McpServersConfig, McpToolDefinition, ServerConfig};
