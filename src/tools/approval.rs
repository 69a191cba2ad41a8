//! Supervisor approval — a human-in-the-loop tool.
//!
//! The model calls this when a customer asks for a price below the quote.
//! The application is printed for the operator and the operator's reply is
//! returned verbatim. There is no timeout; the turn waits for the operator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent_core::errors::AgentError;
use crate::console::Console;
use crate::inference::types::ToolDefinition;

use super::args::required_str;
use super::LocalTool;

const BANNER_WIDTH: usize = 50;
const APPROVAL_PROMPT: &str = "主管请批复 (同意/拒绝/其他指令): ";

pub struct AskSupervisorApproval {
    console: Arc<Console>,
}

impl AskSupervisorApproval {
    const NAME: &'static str = "ask_supervisor_approval";

    pub fn new(console: Arc<Console>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl LocalTool for AskSupervisorApproval {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            Self::NAME,
            "Send a price application to the supervisor (the human operator) and wait for the reply. \
             Use this tool when the customer requests a price lower than the calculated price.",
            json!({
                "type": "object",
                "properties": {
                    "application_details": {
                        "type": "string",
                        "description": "The application details: size, configuration, quoted price, requested price, reason."
                    }
                },
                "required": ["application_details"]
            }),
        )
    }

    async fn call(&mut self, arguments: &Value) -> Result<String, AgentError> {
        let details = required_str(Self::NAME, arguments, "application_details")?;

        let rule = "=".repeat(BANNER_WIDTH);
        println!("\n{rule}\n📢 【向主管申请价格】\n{details}\n{rule}\n");
        tracing::info!(details_len = details.len(), "waiting for supervisor approval");

        let reply = self
            .console
            .read_line(APPROVAL_PROMPT)
            .await
            .map_err(|e| AgentError::ToolExecutionError {
                reason: format!("failed to read operator input: {e}"),
            })?
            .ok_or_else(|| AgentError::ToolExecutionError {
                reason: "operator input closed before a reply was given".into(),
            })?;

        tracing::info!(reply = %reply, "supervisor replied");
        Ok(format!("主管批复: {}", reply.trim()))
    }
}
