//! MCP Client — high-level interface for tool execution.
//!
//! Owns the server processes and the aggregated registry, and turns
//! `tools/call` responses into plain result text for the ToolRouter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::inference::types::ToolDefinition;

use super::errors::McpError;
use super::lifecycle::{self, ManagedServer};
use super::registry::ToolRegistry;
use super::transport::extract_result;
use super::types::{CallToolResult, McpServersConfig, ServerConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution (ms).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── McpClient ───────────────────────────────────────────────────────────────

/// MCP client that manages the configured servers and routes tool calls.
pub struct McpClient {
    servers: HashMap<String, ManagedServer>,
    configs: HashMap<String, ServerConfig>,
    pub registry: ToolRegistry,
    call_timeout_ms: u64,
}

impl McpClient {
    pub fn new(config: McpServersConfig) -> Self {
        Self {
            servers: HashMap::new(),
            configs: config.servers,
            registry: ToolRegistry::new(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Set the tool call timeout in milliseconds.
    pub fn set_call_timeout(&mut self, timeout_ms: u64) {
        self.call_timeout_ms = timeout_ms;
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Start all configured servers and build the tool registry.
    ///
    /// Returns the servers that failed to start; the rest stay usable.
    pub async fn start_all(&mut self) -> Vec<(String, McpError)> {
        let (servers, errors) = lifecycle::spawn_all_servers(&self.configs).await;

        // Register in name order so duplicate resolution is deterministic.
        let mut names: Vec<&String> = servers.keys().collect();
        names.sort();
        for name in names {
            self.registry.register_server_tools(name, servers[name].tools.clone());
        }

        for (name, err) in &errors {
            tracing::warn!(server = %name, error = %err, "MCP server failed to start");
        }

        self.servers = servers;
        errors
    }

    /// Names of servers that are currently running.
    pub fn running_servers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.servers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Kill every server process.
    pub async fn shutdown_all(&mut self) {
        lifecycle::shutdown_all_servers(&mut self.servers).await;
        self.registry = ToolRegistry::new();
    }

    // ─── Catalog ─────────────────────────────────────────────────────────

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.get_tool(name).is_some()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.to_tool_definitions()
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool call and return the joined text content.
    ///
    /// A JSON-RPC error or an `isError` result becomes `McpError::ToolFailed`.
    pub async fn call_tool(&mut self, tool_name: &str, arguments: &serde_json::Value) -> Result<String, McpError> {
        let start = Instant::now();

        self.registry.validate_tool_call(tool_name, arguments)?;

        let server_name = self
            .registry
            .get_server_for_tool(tool_name)
            .ok_or(McpError::UnknownTool {
                name: tool_name.to_string(),
            })?
            .to_string();

        let transport = &self
            .servers
            .get(&server_name)
            .ok_or(McpError::ServerCrashed {
                name: server_name.clone(),
                reason: "server not running".into(),
            })?
            .transport;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let response = tokio::time::timeout(
            Duration::from_millis(self.call_timeout_ms),
            transport.request("tools/call", Some(params)),
        )
        .await
        .map_err(|_| McpError::Timeout {
            tool: tool_name.to_string(),
            timeout_ms: self.call_timeout_ms,
        })?
        .map_err(|e| match e {
            McpError::TransportError { .. } => McpError::ServerCrashed {
                name: server_name.clone(),
                reason: e.to_string(),
            },
            other => other,
        })?;

        let result = match extract_result(response) {
            Ok(value) => value,
            Err(McpError::ServerError { code, message, .. }) => {
                return Err(McpError::ToolFailed {
                    tool: tool_name.to_string(),
                    message: format!("[{code}] {message}"),
                })
            }
            Err(e) => return Err(e),
        };

        let call: CallToolResult = serde_json::from_value(result).map_err(|e| McpError::TransportError {
            server: server_name.clone(),
            reason: format!("malformed tools/call result: {e}"),
        })?;

        tracing::debug!(
            server = %server_name,
            tool = tool_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            is_error = call.is_error,
            "tools/call returned"
        );

        let text = call.text();
        if call.is_error {
            return Err(McpError::ToolFailed {
                tool: tool_name.to_string(),
                message: text,
            });
        }
        Ok(text)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
