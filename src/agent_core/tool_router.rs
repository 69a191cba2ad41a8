//! ToolRouter — dispatches model tool requests through the result cache.
//!
//! The ToolRouter sits between the ConversationLoop and whatever executes
//! tools (the MCP client plus local tools). It handles:
//! - Resolution against the bound catalog, with a configurable policy for
//!   names the catalog does not know
//! - Cache lookup for pure kinds (`query`, `describe_table`)
//! - Invocation, with failures turned into `Error: ` result text
//! - Preview text for console progress output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::inference::types::ToolDefinition;

use super::cache::{cache_slot, ToolResultCache};
use super::errors::AgentError;
use super::types::ToolRequest;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Prefix of every failed tool result handed back to the model.
pub const ERROR_PREFIX: &str = "Error: ";

/// Default number of characters shown when previewing a tool result.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

// ─── ToolInvoker ────────────────────────────────────────────────────────────

/// Anything that can execute named tools.
///
/// Calls are issued one at a time; implementations own a single channel to
/// the tool server and need not be reentrant.
#[async_trait]
pub trait ToolInvoker: Send {
    /// Definitions of every tool in the bound catalog, for the model request.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether `name` is in the catalog.
    fn has_tool(&self, name: &str) -> bool;

    /// Execute `name` with `arguments` and return its text result.
    async fn invoke(&mut self, name: &str, arguments: &serde_json::Value) -> Result<String, AgentError>;
}

/// What to do when the model names a tool the catalog does not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// Append an `Error: unknown tool '<name>'` result so every request keeps
    /// a matching ToolResult.
    #[default]
    Report,
    /// Append nothing for the request.
    Skip,
}

/// Result of dispatching one request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Served from the cache without invoking the tool.
    Cached { text: String },
    /// Invoked successfully.
    Executed { text: String },
    /// Invocation failed; `text` carries the `Error: ` prefix.
    Failed { text: String },
    /// The catalog does not know the tool. `text` is `None` under `Skip`.
    Unresolved { name: String, text: Option<String> },
}

impl DispatchOutcome {
    /// Text to append as the ToolResult, if any.
    pub fn result_text(&self) -> Option<&str> {
        match self {
            Self::Cached { text } | Self::Executed { text } | Self::Failed { text } => Some(text),
            Self::Unresolved { text, .. } => text.as_deref(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached { .. })
    }
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Routes tool requests for one session.
pub struct ToolRouter<I> {
    invoker: I,
    cache: ToolResultCache,
    policy: UnknownToolPolicy,
}

impl<I: ToolInvoker> ToolRouter<I> {
    pub fn new(invoker: I, cache: ToolResultCache, policy: UnknownToolPolicy) -> Self {
        Self {
            invoker,
            cache,
            policy,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.invoker.definitions()
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn invoker_mut(&mut self) -> &mut I {
        &mut self.invoker
    }

    pub fn cache(&self) -> &ToolResultCache {
        &self.cache
    }

    /// Consume the router and hand back the invoker (for shutdown).
    pub fn into_invoker(self) -> I {
        self.invoker
    }

    /// Dispatch one request: resolve, consult the cache, invoke.
    ///
    /// Only successful results are cached, so a transient failure is retried
    /// the next time the model asks.
    pub async fn dispatch(&mut self, request: &ToolRequest) -> DispatchOutcome {
        if !self.invoker.has_tool(&request.name) {
            tracing::warn!(tool = %request.name, policy = ?self.policy, "model requested unknown tool");
            let text = match self.policy {
                UnknownToolPolicy::Report => Some(format!(
                    "{ERROR_PREFIX}{}",
                    AgentError::UnknownTool {
                        name: request.name.clone()
                    }
                )),
                UnknownToolPolicy::Skip => None,
            };
            return DispatchOutcome::Unresolved {
                name: request.name.clone(),
                text,
            };
        }

        if !request.arguments.is_object() {
            tracing::warn!(tool = %request.name, "tool arguments are not a JSON object");
            let err = AgentError::InvalidArguments {
                tool: request.name.clone(),
                reason: format!("expected a JSON object, got {}", request.arguments_text()),
            };
            return DispatchOutcome::Failed {
                text: format!("{ERROR_PREFIX}{err}"),
            };
        }

        let slot = cache_slot(&request.name, &request.arguments);
        if let Some(slot) = &slot {
            if let Some(text) = self.cache.get(slot) {
                tracing::debug!(tool = %request.name, key = %slot.key, "tool cache hit");
                return DispatchOutcome::Cached { text };
            }
        }

        let start = std::time::Instant::now();
        match self.invoker.invoke(&request.name, &request.arguments).await {
            Ok(text) => {
                tracing::info!(
                    tool = %request.name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    result_len = text.len(),
                    "tool executed"
                );
                if let Some(slot) = &slot {
                    self.cache.put(slot, text.clone());
                }
                DispatchOutcome::Executed { text }
            }
            Err(e) => {
                tracing::warn!(tool = %request.name, error = %e, "tool execution failed");
                DispatchOutcome::Failed {
                    text: format!("{ERROR_PREFIX}{e}"),
                }
            }
        }
    }
}

// ─── Free Functions ─────────────────────────────────────────────────────────

/// Shorten `text` to `max_chars` characters, appending `...` when cut.
///
/// Counts characters, not bytes, so multi-byte text never splits mid-char.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
