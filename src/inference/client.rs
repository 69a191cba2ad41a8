//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests with the bound tool catalog
//! and parses the reply into an `AssistantReply`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use crate::agent_core::types::{AssistantReply, ConversationEntry};
use crate::config::ModelConfig;

use super::errors::InferenceError;
use super::response::parse_completion_response;
use super::types::{ChatCompletionRequest, ChatMessage, ToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ChatModel ───────────────────────────────────────────────────────────────

/// A model that turns a prompt plus tool catalog into one assistant reply.
#[async_trait]
pub trait ChatModel: Send {
    async fn complete(
        &mut self,
        prompt: &[ConversationEntry],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for a hosted OpenAI-compatible chat endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelConfig,
}

impl InferenceClient {
    /// Build a client for `config`. Does not check connectivity; that happens
    /// on the first request.
    pub fn from_config(config: ModelConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConfigError {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }

    fn build_request(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> ChatCompletionRequest {
        let tools = (!tools.is_empty()).then(|| tools.to_vec());
        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        }
    }

    /// Send a non-streaming chat completion request.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.build_request(messages, tools);

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = tools.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: self.config.request_timeout_secs,
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::InvalidResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        let reply = parse_completion_response(&body_text)?;
        tracing::debug!(
            content_len = reply.content.len(),
            tool_calls = reply.tool_requests.len(),
            "chat completion received"
        );
        Ok(reply)
    }
}

#[async_trait]
impl ChatModel for InferenceClient {
    async fn complete(
        &mut self,
        prompt: &[ConversationEntry],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply, InferenceError> {
        let messages = prompt.iter().map(ChatMessage::from).collect();
        self.chat_completion(messages, tools).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
