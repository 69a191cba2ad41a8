//! ConversationLoop — runs one user turn end to end.
//!
//! A turn moves through `AwaitingUserInput → Thinking → {Acting → Thinking}*
//! → Answered`:
//! - the user input is appended to the session log and key facts are
//!   re-extracted from the full log
//! - the working prompt is the composed instruction plus the windowed
//!   non-instruction entries
//! - each model reply either carries tool requests (dispatched through the
//!   ToolRouter, results appended to the working prompt) or is the answer
//! - on answer, the new working-prompt entries are merged into the log, facts
//!   are refreshed and the session is saved
//!
//! The composed instruction only ever lives in the working prompt; the log
//! keeps the static instruction it was created with.

use crate::inference::ChatModel;

use super::errors::{AgentError, TurnError};
use super::key_facts;
use super::prompt::compose;
use super::session::{new_session_id, SessionStore};
use super::tool_router::{DispatchOutcome, ToolInvoker, ToolRouter};
use super::types::{ConversationEntry, KeyFacts, ToolRequest};
use super::window::{window, DEFAULT_WINDOW_SIZE};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default maximum think/act cycles per user turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

// ─── Settings & Callbacks ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Non-instruction entries kept in each prompt.
    pub window_size: usize,
    /// Think/act cycles allowed before a turn is aborted.
    pub max_rounds: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Progress callbacks for the console. Every method defaults to a no-op.
pub trait TurnObserver: Send {
    /// The model produced text alongside tool requests.
    fn on_thinking(&mut self, _content: &str) {}
    /// A tool request is about to be dispatched.
    fn on_tool_call(&mut self, _request: &ToolRequest) {}
    /// A tool request finished.
    fn on_tool_result(&mut self, _request: &ToolRequest, _outcome: &DispatchOutcome) {}
    /// The model produced its final answer.
    fn on_answer(&mut self, _content: &str) {}
}

/// Observer that ignores every event.
pub struct SilentObserver;

impl TurnObserver for SilentObserver {}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    /// Model requests made during the turn.
    pub rounds: usize,
    /// Whether the post-answer save succeeded.
    pub persisted: bool,
}

/// The session currently bound to the loop.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub id: String,
    pub log: Vec<ConversationEntry>,
    pub facts: KeyFacts,
}

// ─── ConversationLoop ───────────────────────────────────────────────────────

/// Drives turns for a single session at a time.
pub struct ConversationLoop<M, I> {
    model: M,
    router: ToolRouter<I>,
    store: SessionStore,
    session: ActiveSession,
    static_instruction: String,
    settings: LoopSettings,
}

impl<M: ChatModel, I: ToolInvoker> ConversationLoop<M, I> {
    /// Create a loop bound to a fresh session.
    pub fn new(
        model: M,
        router: ToolRouter<I>,
        store: SessionStore,
        static_instruction: impl Into<String>,
        settings: LoopSettings,
    ) -> Self {
        let static_instruction = static_instruction.into();
        let session = Self::fresh_session(&static_instruction);
        Self {
            model,
            router,
            store,
            session,
            static_instruction,
            settings,
        }
    }

    fn fresh_session(static_instruction: &str) -> ActiveSession {
        ActiveSession {
            id: new_session_id(),
            log: vec![ConversationEntry::instruction(static_instruction)],
            facts: KeyFacts::new(),
        }
    }

    /// Replace the bound session with a new, empty one.
    pub fn start_new_session(&mut self) {
        self.session = Self::fresh_session(&self.static_instruction);
        tracing::info!(session_id = %self.session.id, "started new session");
    }

    /// Bind the loop to a stored session. Unknown or unreadable sessions
    /// resume as empty logs under the requested id.
    pub fn resume_session(&mut self, session_id: &str) {
        let loaded = self.store.load(session_id);
        let log = if loaded.entries.is_empty() {
            vec![ConversationEntry::instruction(self.static_instruction.as_str())]
        } else {
            loaded.entries
        };
        self.session = ActiveSession {
            id: session_id.to_string(),
            log,
            facts: loaded.facts,
        };
        tracing::info!(
            session_id,
            entries = self.session.log.len(),
            facts = self.session.facts.len(),
            "resumed session"
        );
    }

    pub fn session(&self) -> &ActiveSession {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn router(&self) -> &ToolRouter<I> {
        &self.router
    }

    /// Consume the loop, returning the router (for tool-server shutdown).
    pub fn into_router(self) -> ToolRouter<I> {
        self.router
    }

    /// Persist the bound session.
    pub fn save(&self) -> Result<(), AgentError> {
        self.store
            .save(&self.session.id, &self.session.log, &self.session.facts)
    }

    /// Whether the bound session holds anything beyond the instruction.
    pub fn has_exchanges(&self) -> bool {
        self.session.log.iter().any(|e| !e.is_instruction())
    }

    /// Persist the session unless it is still empty. Returns whether a file
    /// was written.
    pub fn save_if_started(&self) -> Result<bool, AgentError> {
        if !self.has_exchanges() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Working prompt for the next model request: composed instruction first,
    /// then the windowed non-instruction log entries.
    pub fn build_prompt(&self) -> Vec<ConversationEntry> {
        let composed = compose(&self.static_instruction, &self.session.facts);
        let mut view = Vec::with_capacity(self.session.log.len() + 1);
        view.push(ConversationEntry::instruction(composed));
        view.extend(
            self.session
                .log
                .iter()
                .filter(|e| !e.is_instruction())
                .cloned(),
        );
        window(&view, self.settings.window_size)
    }

    fn refresh_facts(&mut self) {
        let extracted = key_facts::extract(&self.session.log);
        self.session.facts.merge(&extracted);
    }

    /// Run one user turn to its final answer.
    ///
    /// On error the working prompt is discarded; the UserTurn stays in the log.
    pub async fn run_turn(
        &mut self,
        input: &str,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome, TurnError> {
        self.session.log.push(ConversationEntry::user(input));
        self.refresh_facts();

        let mut prompt = self.build_prompt();
        let turn_start = prompt.len();
        let tools = self.router.definitions();

        tracing::info!(
            session_id = %self.session.id,
            prompt_entries = prompt.len(),
            log_entries = self.session.log.len(),
            facts = self.session.facts.len(),
            "turn started"
        );

        for round in 1..=self.settings.max_rounds {
            let reply = match self.model.complete(&prompt, &tools).await {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(session_id = %self.session.id, round, error = %e, "model call failed");
                    return Err(e.into());
                }
            };

            if reply.is_final() {
                let answer = reply.content.clone();
                observer.on_answer(&answer);
                prompt.push(reply.into_entry());

                self.session.log.extend(prompt.drain(turn_start..));
                self.refresh_facts();

                let persisted = match self.save() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(session_id = %self.session.id, error = %e, "failed to save session");
                        false
                    }
                };

                tracing::info!(session_id = %self.session.id, rounds = round, persisted, "turn answered");
                return Ok(TurnOutcome {
                    answer,
                    rounds: round,
                    persisted,
                });
            }

            if !reply.content.trim().is_empty() {
                observer.on_thinking(&reply.content);
            }

            let requests = reply.tool_requests.clone();
            prompt.push(reply.into_entry());

            for request in &requests {
                observer.on_tool_call(request);
                let outcome = self.router.dispatch(request).await;
                observer.on_tool_result(request, &outcome);
                if let Some(text) = outcome.result_text() {
                    prompt.push(ConversationEntry::tool_result(request.id.as_str(), text));
                }
            }
        }

        tracing::warn!(
            session_id = %self.session.id,
            limit = self.settings.max_rounds,
            "turn aborted: tool round limit exceeded"
        );
        Err(TurnError::RoundLimitExceeded {
            limit: self.settings.max_rounds,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent_core::cache::ToolResultCache;
    use crate::agent_core::tool_router::UnknownToolPolicy;
    use crate::agent_core::types::AssistantReply;
    use crate::inference::{InferenceError, ToolDefinition};

    /// Model that replays scripted replies and records every prompt.
    struct ScriptedModel {
        replies: VecDeque<Result<AssistantReply, InferenceError>>,
        prompts: Vec<Vec<ConversationEntry>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<AssistantReply, InferenceError>>) -> Self {
            Self {
                replies: replies.into(),
                prompts: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &mut self,
            prompt: &[ConversationEntry],
            _tools: &[ToolDefinition],
        ) -> Result<AssistantReply, InferenceError> {
            self.prompts.push(prompt.to_vec());
            self.replies.pop_front().unwrap_or_else(|| {
                Ok(AssistantReply {
                    content: "done".into(),
                    tool_requests: Vec::new(),
                })
            })
        }
    }

    struct EchoInvoker;

    #[async_trait]
    impl ToolInvoker for EchoInvoker {
        fn definitions(&self) -> Vec<ToolDefinition> {
            Vec::new()
        }

        fn has_tool(&self, name: &str) -> bool {
            name == "query"
        }

        async fn invoke(&mut self, _name: &str, arguments: &serde_json::Value) -> Result<String, AgentError> {
            Ok(format!("rows for {}", arguments["sql"]))
        }
    }

    fn answer(text: &str) -> Result<AssistantReply, InferenceError> {
        Ok(AssistantReply {
            content: text.into(),
            tool_requests: Vec::new(),
        })
    }

    fn tool_call(id: &str, sql: &str) -> Result<AssistantReply, InferenceError> {
        Ok(AssistantReply {
            content: String::new(),
            tool_requests: vec![ToolRequest {
                id: id.into(),
                name: "query".into(),
                arguments: json!({"sql": sql}),
            }],
        })
    }

    fn build(
        dir: &std::path::Path,
        replies: Vec<Result<AssistantReply, InferenceError>>,
        settings: LoopSettings,
    ) -> ConversationLoop<ScriptedModel, EchoInvoker> {
        ConversationLoop::new(
            ScriptedModel::new(replies),
            ToolRouter::new(EchoInvoker, ToolResultCache::default(), UnknownToolPolicy::Report),
            SessionStore::new(dir),
            "system",
            settings,
        )
    }

    #[tokio::test]
    async fn test_turn_with_tool_round_merges_into_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut lp = build(
            dir.path(),
            vec![tool_call("c1", "SELECT 1"), answer("Final Answer\n价格：2350")],
            LoopSettings::default(),
        );

        let outcome = lp.run_turn("多少钱", &mut SilentObserver).await.unwrap();
        assert_eq!(outcome.rounds, 2);
        assert!(outcome.persisted);

        let log = &lp.session().log;
        assert_eq!(log.len(), 5);
        assert_eq!(log[0], ConversationEntry::instruction("system"));
        assert_eq!(log[1], ConversationEntry::user("多少钱"));
        assert_eq!(log[3], ConversationEntry::tool_result("c1", "rows for \"SELECT 1\""));
        assert_eq!(lp.session().facts.get("价格"), Some("2350"));
        assert_eq!(lp.store().list().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_session_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut lp = build(dir.path(), vec![answer("ok")], LoopSettings::default());
        assert!(!lp.has_exchanges());
        assert!(!lp.save_if_started().unwrap());
        assert!(lp.store().list().is_empty());

        lp.run_turn("hi", &mut SilentObserver).await.unwrap();
        assert!(lp.has_exchanges());
        assert!(lp.save_if_started().unwrap());
        assert_eq!(lp.store().list().len(), 1);
    }

    #[tokio::test]
    async fn test_model_error_keeps_user_turn_only() {
        let dir = tempfile::tempdir().unwrap();
        let err = InferenceError::ConnectionFailed {
            endpoint: "http://localhost".into(),
            reason: "refused".into(),
        };
        let mut lp = build(dir.path(), vec![tool_call("c1", "SELECT 1"), Err(err)], LoopSettings::default());

        let result = lp.run_turn("hi", &mut SilentObserver).await;
        assert!(matches!(result, Err(TurnError::ModelCall(_))));
        assert_eq!(
            lp.session().log,
            vec![ConversationEntry::instruction("system"), ConversationEntry::user("hi")]
        );
    }

    #[tokio::test]
    async fn test_round_limit_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let replies = (0..5).map(|i| tool_call(&format!("c{i}"), "SELECT 1")).collect();
        let mut lp = build(
            dir.path(),
            replies,
            LoopSettings {
                window_size: 15,
                max_rounds: 3,
            },
        );

        let result = lp.run_turn("loop", &mut SilentObserver).await;
        assert!(matches!(result, Err(TurnError::RoundLimitExceeded { limit: 3 })));
        assert_eq!(lp.session().log.len(), 2);
    }

    #[tokio::test]
    async fn test_composed_instruction_not_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut lp = build(
            dir.path(),
            vec![answer("Final Answer\n尺寸：55寸"), answer("ok")],
            LoopSettings::default(),
        );
        lp.run_turn("a", &mut SilentObserver).await.unwrap();
        lp.run_turn("b", &mut SilentObserver).await.unwrap();

        let second_prompt = &lp.model.prompts[1];
        assert_eq!(second_prompt[0].content(), "尺寸：55寸\n\nsystem");
        let instructions = lp.session().log.iter().filter(|e| e.is_instruction()).count();
        assert_eq!(instructions, 1);
        assert_eq!(lp.session().log[0].content(), "system");
    }

    #[tokio::test]
    async fn test_resume_session_restores_log_and_facts() {
        let dir = tempfile::tempdir().unwrap();
        let mut lp = build(dir.path(), vec![answer("Final Answer\n配置：i7")], LoopSettings::default());
        lp.run_turn("配置?", &mut SilentObserver).await.unwrap();
        let id = lp.session_id().to_string();

        let mut other = build(dir.path(), Vec::new(), LoopSettings::default());
        other.resume_session(&id);
        assert_eq!(other.session().log, lp.session().log);
        assert_eq!(other.session().facts.get("配置"), Some("i7"));

        other.resume_session("missing");
        assert_eq!(other.session().log, vec![ConversationEntry::instruction("system")]);
    }
}
