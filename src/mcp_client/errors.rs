//! Errors raised while talking to MCP tool servers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    /// The child process could not be launched.
    #[error("could not start MCP server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// `initialize` / `tools/list` did not complete.
    #[error("MCP server '{name}' handshake failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// Pipe I/O failed or a line could not be encoded.
    #[error("MCP server '{server}' pipe error: {reason}")]
    TransportError { server: String, reason: String },

    /// JSON-RPC `error` object from the server.
    #[error("MCP server returned error {code}: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("no MCP server provides tool '{name}'")]
    UnknownTool { name: String },

    /// Required input fields are missing.
    #[error("bad arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool '{tool}' gave no reply within {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    /// The server process exited or closed stdout.
    #[error("MCP server '{name}' is not running: {reason}")]
    ServerCrashed { name: String, reason: String },

    /// The tool ran but reported `isError`.
    #[error("{message}")]
    ToolFailed { tool: String, message: String },
}
