//! Tool registry — aggregates tool definitions across all MCP servers.
//!
//! Provides:
//! - Tool lookup by bare name, as the model sees it
//! - The owning server for each tool
//! - Validation that a tool call carries the schema's required fields
//! - Conversion into OpenAI function definitions for the model request

use std::collections::HashMap;

use crate::inference::types::ToolDefinition;

use super::errors::McpError;
use super::types::McpToolDefinition;

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Aggregated tool registry across all MCP servers.
///
/// Names are kept bare (`query`, not `mysql.query`) because OpenAI-compatible
/// endpoints reject dots in function names. When two servers expose the same
/// name, the first registration wins.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// `tool_name → (server_name, definition)`.
    tools: HashMap<String, (String, McpToolDefinition)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register tools from a server.
    pub fn register_server_tools(&mut self, server_name: &str, tools: Vec<McpToolDefinition>) {
        for tool in tools {
            if let Some((owner, _)) = self.tools.get(&tool.name) {
                tracing::warn!(
                    tool = %tool.name,
                    owner = %owner,
                    ignored = server_name,
                    "duplicate tool name across servers"
                );
                continue;
            }
            self.tools.insert(tool.name.clone(), (server_name.to_string(), tool));
        }
    }

    /// Remove all tools belonging to a server.
    pub fn unregister_server(&mut self, server_name: &str) {
        self.tools.retain(|_, (srv, _)| srv != server_name);
    }

    pub fn get_tool(&self, name: &str) -> Option<&McpToolDefinition> {
        self.tools.get(name).map(|(_, def)| def)
    }

    /// Get the server name that owns a tool.
    pub fn get_server_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.tools.get(tool_name).map(|(srv, _)| srv.as_str())
    }

    /// Sorted tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of tools registered by a specific server.
    pub fn tools_for_server(&self, server_name: &str) -> usize {
        self.tools.values().filter(|(srv, _)| srv == server_name).count()
    }

    /// Validate a tool call: tool exists and required fields are present.
    ///
    /// Full JSON Schema validation is left to the server.
    pub fn validate_tool_call(&self, tool_name: &str, arguments: &serde_json::Value) -> Result<(), McpError> {
        let def = self.get_tool(tool_name).ok_or(McpError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        let Some(required) = def.input_schema.get("required").and_then(|r| r.as_array()) else {
            return Ok(());
        };

        let args_obj = arguments.as_object();
        for field_name in required.iter().filter_map(|f| f.as_str()) {
            let present = args_obj.is_some_and(|obj| obj.contains_key(field_name));
            if !present {
                return Err(McpError::InvalidArguments {
                    tool: tool_name.to_string(),
                    reason: format!("missing required field: '{field_name}'"),
                });
            }
        }

        Ok(())
    }

    /// All tools as OpenAI function definitions, sorted by name.
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| self.get_tool(name))
            .map(|def| ToolDefinition::function(&def.name, &def.description, def.input_schema.clone()))
            .collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
