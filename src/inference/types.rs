//! Shared types for the inference client.
//!
//! These mirror the OpenAI Chat Completions API types, used for both
//! request building and conversion from conversation entries.

use serde::{Deserialize, Serialize};

use crate::agent_core::types::ConversationEntry;

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// `content` is serialized as `""` (never `null`) so assistant messages that
/// only carry tool calls are accepted by every compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl From<&ConversationEntry> for ChatMessage {
    fn from(entry: &ConversationEntry) -> Self {
        match entry {
            ConversationEntry::Instruction { content } => Self {
                role: Role::System,
                content: Some(content.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            ConversationEntry::UserTurn { content } => Self {
                role: Role::User,
                content: Some(content.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            ConversationEntry::AssistantTurn {
                content,
                tool_requests,
            } => Self {
                role: Role::Assistant,
                content: (!content.is_empty()).then(|| content.clone()),
                tool_call_id: None,
                tool_calls: (!tool_requests.is_empty()).then(|| {
                    tool_requests
                        .iter()
                        .map(|r| ToolCallResponse {
                            id: r.id.clone(),
                            r#type: "function".into(),
                            function: FunctionCallResponse {
                                name: r.name.clone(),
                                arguments: r.arguments_text(),
                            },
                        })
                        .collect()
                }),
            },
            ConversationEntry::ToolResult {
                request_id,
                content,
            } => Self {
                role: Role::Tool,
                content: Some(content.clone()),
                tool_call_id: Some(request_id.clone()),
                tool_calls: None,
            },
        }
    }
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    /// A `function` tool with the given JSON Schema parameters.
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            r#type: "function".into(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Function definition within a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Tool call as carried in OpenAI messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details; `arguments` is a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
