//! Chat completion response parsing.
//!
//! Turns the body of a non-streaming `/chat/completions` response into an
//! `AssistantReply`. Tool calls without an id get a generated `call_<uuid>`.
//! Malformed argument JSON does not fail the reply; the raw text is kept so
//! the call can be answered with an error and retried by the model.

use serde::Deserialize;
use uuid::Uuid;

use crate::agent_core::types::{AssistantReply, ToolRequest};

use super::errors::InferenceError;

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CompletionToolCall>>,
}

#[derive(Deserialize)]
struct CompletionToolCall {
    id: Option<String>,
    function: CompletionFunction,
}

#[derive(Deserialize)]
struct CompletionFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Parse a completion body into the assistant's reply.
pub fn parse_completion_response(body: &str) -> Result<AssistantReply, InferenceError> {
    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::InvalidResponse {
            reason: format!("failed to parse completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::InvalidResponse {
            reason: "empty choices array".into(),
        })?;

    let mut tool_requests = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let raw = tc.function.arguments;
        // Some endpoints send "" for argument-less calls.
        let arguments = if raw.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    // Kept as text; the router answers it with an error result.
                    tracing::warn!(tool = %tc.function.name, error = %e, "tool call arguments are not valid JSON");
                    serde_json::Value::String(raw)
                }
            }
        };
        tool_requests.push(ToolRequest {
            id: tc
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: tc.function.name,
            arguments,
        });
    }

    Ok(AssistantReply {
        content: choice.message.content.unwrap_or_default(),
        tool_requests,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
