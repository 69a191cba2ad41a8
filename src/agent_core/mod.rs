//! Agent Core — conversation orchestration for the sales assistant.
//!
//! Submodules:
//! - `cache`: Bounded LRU caches for pure tool results (SQL, schema)
//! - `window`: Context windowing with tool-result pairing repair
//! - `key_facts`: Declarative extraction of confirmed order facts
//! - `prompt`: Composition of the per-turn leading instruction
//! - `tool_router`: Dispatches tool requests through the cache
//! - `conversation`: The per-turn think/act loop
//! - `session`: JSON session persistence
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod cache;
pub mod conversation;
pub mod errors;
pub mod key_facts;
pub mod prompt;
pub mod session;
pub mod tool_router;
pub mod types;
pub mod window;

// Re-exports for convenience
pub use cache::{BoundedCache, ToolResultCache};
pub use conversation::{ConversationLoop, LoopSettings, SilentObserver, TurnObserver, TurnOutcome};
pub use errors::{AgentError, TurnError};
pub use session::SessionStore;
pub use tool_router::{DispatchOutcome, ToolInvoker, ToolRouter, UnknownToolPolicy};
pub use types::{AssistantReply, ConversationEntry, KeyFacts, SessionListing, ToolRequest};
