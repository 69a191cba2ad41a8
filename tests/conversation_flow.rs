//! End-to-end conversation flows with a scripted model and a counting invoker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use sales_agent::agent_core::{
    AgentError, AssistantReply, ConversationEntry, ConversationLoop, LoopSettings, SessionStore, SilentObserver,
    ToolInvoker, ToolRequest, ToolResultCache, ToolRouter, UnknownToolPolicy,
};
use sales_agent::inference::{ChatModel, InferenceError, ToolDefinition};

const SYSTEM: &str = "你是一个智能数据库助手。";
const PRICE_SQL: &str = "SELECT * FROM 商品报价表 WHERE 尺寸 = '55寸'";

// ─── Fixtures ───────────────────────────────────────────────────────────────

/// Replays canned replies and records every prompt it was given.
struct ScriptedModel {
    replies: VecDeque<AssistantReply>,
    prompts: Arc<Mutex<Vec<Vec<ConversationEntry>>>>,
}

impl ScriptedModel {
    fn new(replies: Vec<AssistantReply>) -> (Self, Arc<Mutex<Vec<Vec<ConversationEntry>>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                replies: replies.into(),
                prompts: prompts.clone(),
            },
            prompts,
        )
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &mut self,
        prompt: &[ConversationEntry],
        _tools: &[ToolDefinition],
    ) -> Result<AssistantReply, InferenceError> {
        self.prompts.lock().unwrap().push(prompt.to_vec());
        Ok(self
            .replies
            .pop_front()
            .unwrap_or_else(|| answer("Final Answer:\n好的")))
    }
}

/// Answers `query` with a fixed row and counts invocations.
struct CountingInvoker {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolInvoker for CountingInvoker {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "query",
            "Run a read-only SQL query",
            json!({"type": "object", "properties": {"sql": {"type": "string"}}, "required": ["sql"]}),
        )]
    }

    fn has_tool(&self, name: &str) -> bool {
        name == "query"
    }

    async fn invoke(&mut self, _name: &str, _arguments: &Value) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(r#"[{"尺寸":"55寸","配置":"单系统/Win10/i5/8+256G","价格":2350}]"#.to_string())
    }
}

fn answer(text: &str) -> AssistantReply {
    AssistantReply {
        content: text.to_string(),
        tool_requests: Vec::new(),
    }
}

fn query_call(id: &str) -> AssistantReply {
    AssistantReply {
        content: String::new(),
        tool_requests: vec![ToolRequest {
            id: id.to_string(),
            name: "query".to_string(),
            arguments: json!({"sql": PRICE_SQL}),
        }],
    }
}

fn build_loop(
    model: ScriptedModel,
    dir: &std::path::Path,
    window_size: usize,
) -> (ConversationLoop<ScriptedModel, CountingInvoker>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = ToolRouter::new(
        CountingInvoker { calls: calls.clone() },
        ToolResultCache::new(16, 16),
        UnknownToolPolicy::Report,
    );
    let settings = LoopSettings {
        window_size,
        max_rounds: 5,
    };
    (
        ConversationLoop::new(model, router, SessionStore::new(dir), SYSTEM, settings),
        calls,
    )
}

fn tool_results(log: &[ConversationEntry]) -> Vec<&str> {
    log.iter()
        .filter_map(|e| match e {
            ConversationEntry::ToolResult { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

// ─── Scenarios ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeated_query_served_from_cache_after_window_truncation() {
    let dir = tempfile::tempdir().unwrap();
    let mut replies = vec![query_call("call_1"), answer("Final Answer:\n55寸 i5 价格 2350 元")];
    for i in 0..6 {
        replies.push(answer(&format!("Final Answer:\n补充说明 {i}")));
    }
    replies.push(query_call("call_2"));
    replies.push(answer("Final Answer:\n仍然是 2350 元"));
    let (model, prompts) = ScriptedModel::new(replies);
    let (mut conversation, calls) = build_loop(model, dir.path(), 4);

    conversation.run_turn("55寸 i5 多少钱？", &mut SilentObserver).await.unwrap();
    for i in 0..6 {
        conversation
            .run_turn(&format!("问题 {i}"), &mut SilentObserver)
            .await
            .unwrap();
    }
    let outcome = conversation
        .run_turn("再确认一下 55寸 i5 的价格", &mut SilentObserver)
        .await
        .unwrap();

    assert_eq!(outcome.answer, "Final Answer:\n仍然是 2350 元");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The first tool result had fallen out of the window before the repeat.
    let prompts = prompts.lock().unwrap();
    let before_repeat = &prompts[prompts.len() - 2];
    assert!(tool_results(before_repeat).is_empty());

    let results = tool_results(&conversation.session().log);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_confirmed_price_reaches_next_instruction() {
    let dir = tempfile::tempdir().unwrap();
    let (model, prompts) = ScriptedModel::new(vec![
        answer("Final Answer:\n尺寸：55寸\n价格：2350"),
        answer("Final Answer:\n好的，已记录。"),
    ]);
    let (mut conversation, _) = build_loop(model, dir.path(), 15);

    conversation.run_turn("55寸多少钱", &mut SilentObserver).await.unwrap();
    conversation.run_turn("我要壁挂的", &mut SilentObserver).await.unwrap();

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts[0][0], ConversationEntry::instruction(SYSTEM));
    assert_eq!(
        prompts[1][0],
        ConversationEntry::instruction(format!("尺寸：55寸\n价格：2350\n\n{SYSTEM}"))
    );
    assert_eq!(conversation.session().facts.get("价格"), Some("2350"));
}

#[tokio::test]
async fn test_session_survives_save_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let (model, _) = ScriptedModel::new(vec![
        query_call("call_1"),
        answer("Final Answer:\n配置：单系统/Win10/i5/8+256G\n价格：2350"),
    ]);
    let (mut conversation, _) = build_loop(model, dir.path(), 15);
    let outcome = conversation.run_turn("55寸 i5 报价", &mut SilentObserver).await.unwrap();
    assert!(outcome.persisted);

    let session_id = conversation.session_id().to_string();
    let saved_log = conversation.session().log.clone();
    let saved_facts = conversation.session().facts.clone();

    let listings = conversation.store().list();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].session_id, session_id);
    assert_eq!(listings[0].message_count, saved_log.len());

    let (model, prompts) = ScriptedModel::new(vec![answer("Final Answer:\n欢迎回来")]);
    let (mut resumed, _) = build_loop(model, dir.path(), 15);
    resumed.resume_session(&session_id);

    assert_eq!(resumed.session().log, saved_log);
    assert_eq!(resumed.session().facts, saved_facts);

    resumed.run_turn("继续", &mut SilentObserver).await.unwrap();
    let prompts = prompts.lock().unwrap();
    assert!(prompts[0][0].content().starts_with("配置：单系统/Win10/i5/8+256G\n价格：2350"));
}
