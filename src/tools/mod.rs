//! Tool catalog — the MCP tools plus the in-process tools bound to a session.
//!
//! This module handles:
//! - The `LocalTool` trait for tools that run inside the agent process
//! - Knowledge search, supervisor approval and pricing tools
//! - `ToolCatalog`, the `ToolInvoker` the ToolRouter dispatches through
//!
//! Local tools shadow MCP tools of the same name.

pub mod approval;
pub mod args;
pub mod knowledge;
pub mod pricing;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::agent_core::errors::AgentError;
use crate::agent_core::tool_router::ToolInvoker;
use crate::inference::types::ToolDefinition;
use crate::mcp_client::McpClient;

pub use approval::AskSupervisorApproval;
pub use knowledge::{KnowledgeIndex, SearchLocalKnowledge, SearchMedia};
pub use pricing::{pricing_tools, CalculateFinalPrice, SqlTemplateTool};

// ─── LocalTool ──────────────────────────────────────────────────────────────

/// A tool executed in-process.
#[async_trait]
pub trait LocalTool: Send {
    fn definition(&self) -> ToolDefinition;

    async fn call(&mut self, arguments: &serde_json::Value) -> Result<String, AgentError>;
}

// ─── ToolCatalog ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ToolCatalog {
    mcp: Option<McpClient>,
    local: BTreeMap<String, Box<dyn LocalTool>>,
}

impl ToolCatalog {
    pub fn new(mcp: Option<McpClient>) -> Self {
        Self {
            mcp,
            local: BTreeMap::new(),
        }
    }

    /// Add a local tool, replacing any earlier one with the same name.
    pub fn register(&mut self, tool: Box<dyn LocalTool>) {
        let name = tool.definition().name().to_string();
        if self.mcp.as_ref().is_some_and(|mcp| mcp.has_tool(&name)) {
            tracing::warn!(tool = %name, "local tool shadows MCP tool");
        }
        self.local.insert(name, tool);
    }

    pub fn with(mut self, tool: Box<dyn LocalTool>) -> Self {
        self.register(tool);
        self
    }

    pub fn mcp(&self) -> Option<&McpClient> {
        self.mcp.as_ref()
    }

    pub fn len(&self) -> usize {
        self.definitions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kill the MCP servers, if any.
    pub async fn shutdown(&mut self) {
        if let Some(mcp) = self.mcp.as_mut() {
            mcp.shutdown_all().await;
        }
    }
}

#[async_trait]
impl ToolInvoker for ToolCatalog {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .mcp
            .iter()
            .flat_map(|mcp| mcp.definitions())
            .filter(|def| !self.local.contains_key(def.name()))
            .collect();
        defs.extend(self.local.values().map(|tool| tool.definition()));
        defs
    }

    fn has_tool(&self, name: &str) -> bool {
        self.local.contains_key(name) || self.mcp.as_ref().is_some_and(|mcp| mcp.has_tool(name))
    }

    async fn invoke(&mut self, name: &str, arguments: &serde_json::Value) -> Result<String, AgentError> {
        if let Some(tool) = self.local.get_mut(name) {
            return tool.call(arguments).await;
        }
        match self.mcp.as_mut() {
            Some(mcp) if mcp.has_tool(name) => {
                mcp.call_tool(name, arguments)
                    .await
                    .map_err(|e| AgentError::ToolExecutionError { reason: e.to_string() })
            }
            _ => Err(AgentError::UnknownTool { name: name.to_string() }),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl LocalTool for Upper {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("upper", "Uppercase text", json!({"type": "object"}))
        }

        async fn call(&mut self, arguments: &serde_json::Value) -> Result<String, AgentError> {
            Ok(arguments["text"].as_str().unwrap_or_default().to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_local_tool_dispatch() {
        let mut catalog = ToolCatalog::new(None).with(Box::new(Upper));
        assert!(catalog.has_tool("upper"));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.invoke("upper", &json!({"text": "ok"})).await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let mut catalog = ToolCatalog::default();
        assert!(catalog.is_empty());
        let err = catalog.invoke("query", &json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool { ref name } if name == "query"));
    }

    #[tokio::test]
    async fn test_pricing_tools_registered() {
        let mut catalog = ToolCatalog::new(None);
        for tool in pricing_tools() {
            catalog.register(tool);
        }
        let names: Vec<String> = catalog.definitions().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "calculate_final_price",
                "dbq_configs_by_size",
                "dbq_i5_i7_price_rows",
                "dbq_price_by_size_config",
                "dbq_size_info",
            ]
        );
    }
}
