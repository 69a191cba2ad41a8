//! SessionStore — JSON persistence of conversation logs and key facts.
//!
//! One file per session, `<dir>/<session_id>.json`:
//!
//! ```json
//! {
//!   "session_id": "3f9c2a1b",
//!   "created_at": "2026-03-02T10:15:04.123456",
//!   "first_created_at": "2026-03-01T09:00:00.000000",
//!   "messages": [{"type": "HumanMessage", "content": "..."}],
//!   "key_info": {"价格": "2350"}
//! }
//! ```
//!
//! `created_at` is rewritten on every save and is what listings sort by;
//! `first_created_at` is carried over from the existing file.

use std::path::{Path, PathBuf};

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use super::errors::AgentError;
use super::types::{ConversationEntry, KeyFacts, SessionListing, ToolRequest};

// ─── On-disk Format ─────────────────────────────────────────────────────────

const SYSTEM_MESSAGE: &str = "SystemMessage";
const HUMAN_MESSAGE: &str = "HumanMessage";
const AI_MESSAGE: &str = "AIMessage";
const TOOL_MESSAGE: &str = "ToolMessage";

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    session_id: String,
    #[serde(default)]
    created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_created_at: Option<String>,
    #[serde(default)]
    messages: Vec<StoredMessage>,
    #[serde(default)]
    key_info: KeyFacts,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    #[serde(rename = "type")]
    kind: String,
    /// A string, or a list of content parts written by other tools.
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<StoredToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToolCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "tool_call_type")]
    kind: String,
}

fn tool_call_type() -> String {
    "tool_call".to_string()
}

/// Only the fields a listing needs; messages are counted, not decoded.
#[derive(Debug, Deserialize)]
struct ListingHeader {
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    messages: Vec<IgnoredAny>,
}

impl From<&ConversationEntry> for StoredMessage {
    fn from(entry: &ConversationEntry) -> Self {
        let (kind, tool_calls, tool_call_id) = match entry {
            ConversationEntry::Instruction { .. } => (SYSTEM_MESSAGE, None, None),
            ConversationEntry::UserTurn { .. } => (HUMAN_MESSAGE, None, None),
            ConversationEntry::AssistantTurn { tool_requests, .. } => {
                let calls = (!tool_requests.is_empty()).then(|| {
                    tool_requests
                        .iter()
                        .map(|r| StoredToolCall {
                            name: r.name.clone(),
                            args: r.arguments.clone(),
                            id: r.id.clone(),
                            kind: tool_call_type(),
                        })
                        .collect()
                });
                (AI_MESSAGE, calls, None)
            }
            ConversationEntry::ToolResult { request_id, .. } => {
                (TOOL_MESSAGE, None, Some(request_id.clone()))
            }
        };
        Self {
            kind: kind.to_string(),
            content: serde_json::Value::String(entry.content().to_string()),
            tool_calls,
            tool_call_id,
        }
    }
}

impl StoredMessage {
    fn into_entry(self) -> ConversationEntry {
        let content = content_text(&self.content);
        match self.kind.as_str() {
            SYSTEM_MESSAGE => ConversationEntry::Instruction { content },
            AI_MESSAGE => ConversationEntry::AssistantTurn {
                content,
                tool_requests: self
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| ToolRequest {
                        id: c.id,
                        name: c.name,
                        arguments: c.args,
                    })
                    .collect(),
            },
            TOOL_MESSAGE => ConversationEntry::ToolResult {
                request_id: self.tool_call_id.unwrap_or_default(),
                content,
            },
            // HumanMessage and anything unrecognized.
            _ => ConversationEntry::UserTurn { content },
        }
    }
}

/// Flatten a stored `content` value to text.
fn content_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| match p {
                serde_json::Value::String(s) => Some(s.as_str()),
                other => other.get("text").and_then(|t| t.as_str()),
            })
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}

/// Local wall-clock timestamp in ISO 8601 with microseconds.
fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

/// Generate a fresh short session id (8 hex chars).
pub fn new_session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

// ─── SessionStore ───────────────────────────────────────────────────────────

/// A session read back from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedSession {
    pub entries: Vec<ConversationEntry>,
    pub facts: KeyFacts,
    pub first_created_at: Option<String>,
}

/// Directory-backed store of session files.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// All readable sessions, most recently saved first.
    ///
    /// Unreadable or unparsable files are skipped. A missing directory is an
    /// empty list.
    pub fn list(&self) -> Vec<SessionListing> {
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(_) => return Vec::new(),
        };

        let mut sessions: Vec<SessionListing> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let session_id = path.file_stem()?.to_str()?.to_string();
                let content = std::fs::read_to_string(&path).ok()?;
                match serde_json::from_str::<ListingHeader>(&content) {
                    Ok(header) => Some(SessionListing {
                        session_id,
                        created_at: header.created_at,
                        message_count: header.messages.len(),
                    }),
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "skipping unreadable session file");
                        None
                    }
                }
            })
            .collect();

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Load a session. Unknown or malformed sessions load as empty.
    pub fn load(&self, session_id: &str) -> LoadedSession {
        match self.try_load(session_id) {
            Ok(Some(loaded)) => {
                tracing::info!(
                    session_id,
                    messages = loaded.entries.len(),
                    facts = loaded.facts.len(),
                    "session loaded"
                );
                loaded
            }
            Ok(None) => LoadedSession::default(),
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to load session, starting empty");
                LoadedSession::default()
            }
        }
    }

    fn try_load(&self, session_id: &str) -> Result<Option<LoadedSession>, AgentError> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let file: SessionFile =
            serde_json::from_str(&content).map_err(|e| AgentError::MalformedSession {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(LoadedSession {
            first_created_at: file.first_created_at.or(Some(file.created_at).filter(|c| !c.is_empty())),
            entries: file.messages.into_iter().map(StoredMessage::into_entry).collect(),
            facts: file.key_info,
        }))
    }

    /// Original creation time recorded in an existing file, if any.
    fn existing_first_created_at(&self, session_id: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.path_for(session_id)).ok()?;
        let file: SessionFile = serde_json::from_str(&content).ok()?;
        file.first_created_at
            .or(Some(file.created_at))
            .filter(|c| !c.is_empty())
    }

    /// Write the session, replacing any previous file atomically.
    pub fn save(
        &self,
        session_id: &str,
        entries: &[ConversationEntry],
        facts: &KeyFacts,
    ) -> Result<(), AgentError> {
        std::fs::create_dir_all(&self.dir)?;

        let created_at = now_timestamp();
        let first_created_at = self
            .existing_first_created_at(session_id)
            .unwrap_or_else(|| created_at.clone());

        let file = SessionFile {
            session_id: session_id.to_string(),
            created_at,
            first_created_at: Some(first_created_at),
            messages: entries.iter().map(StoredMessage::from).collect(),
            key_info: facts.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.path_for(session_id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &path)?;

        tracing::debug!(session_id, messages = entries.len(), "session saved");
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_log() -> Vec<ConversationEntry> {
        vec![
            ConversationEntry::instruction("你是一个智能数据库助手。"),
            ConversationEntry::user("55寸 i5 多少钱"),
            ConversationEntry::AssistantTurn {
                content: String::new(),
                tool_requests: vec![ToolRequest {
                    id: "call_0".into(),
                    name: "query".into(),
                    arguments: json!({"sql": "SELECT 价格 FROM 商品报价表"}),
                }],
            },
            ConversationEntry::tool_result("call_0", "[{\"价格\": 2350}]"),
            ConversationEntry::answer("Final Answer\n价格：2350"),
        ]
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let facts: KeyFacts = [("价格", "2350")].into_iter().collect();

        store.save("abc12345", &sample_log(), &facts).unwrap();
        let loaded = store.load("abc12345");

        assert_eq!(loaded.entries, sample_log());
        assert_eq!(loaded.facts, facts);
        assert!(loaded.first_created_at.is_some());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        store.save("s1", &sample_log(), &KeyFacts::new()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("s1.json")).unwrap()).unwrap();
        assert_eq!(raw["session_id"], "s1");
        assert_eq!(raw["messages"][0]["type"], "SystemMessage");
        assert_eq!(raw["messages"][1]["type"], "HumanMessage");
        assert_eq!(raw["messages"][2]["type"], "AIMessage");
        assert_eq!(raw["messages"][2]["tool_calls"][0]["type"], "tool_call");
        assert_eq!(raw["messages"][2]["tool_calls"][0]["args"]["sql"], "SELECT 价格 FROM 商品报价表");
        assert_eq!(raw["messages"][3]["tool_call_id"], "call_0");
        assert!(raw["messages"][4].get("tool_calls").is_none());
        assert_eq!(raw["key_info"], json!({}));
    }

    #[test]
    fn test_first_created_at_survives_resave() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        let path = dir.path().join("s1.json");
        std::fs::write(
            &path,
            r#"{"session_id":"s1","created_at":"2025-01-01T00:00:00","messages":[]}"#,
        )
        .unwrap();

        store.save("s1", &sample_log(), &KeyFacts::new()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["first_created_at"], "2025-01-01T00:00:00");
        assert_ne!(raw["created_at"], "2025-01-01T00:00:00");
    }

    #[test]
    fn test_load_missing_and_malformed_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert_eq!(store.load("nope"), LoadedSession::default());

        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert_eq!(store.load("bad"), LoadedSession::default());
    }

    #[test]
    fn test_unknown_type_loads_as_user_turn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("x.json"),
            r#"{"session_id":"x","created_at":"t","messages":[
                {"type":"ChatMessage","content":"hello"},
                {"type":"AIMessage","content":[{"type":"text","text":"part"}]}
            ],"key_info":null}"#,
        )
        .unwrap();

        let loaded = SessionStore::new(dir.path()).load("x");
        assert_eq!(
            loaded.entries,
            vec![ConversationEntry::user("hello"), ConversationEntry::answer("part")]
        );
        assert!(loaded.facts.is_empty());
    }

    #[test]
    fn test_list_sorted_desc_and_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
        write("old.json", r#"{"session_id":"old","created_at":"2025-01-01T00:00:00","messages":[{"type":"HumanMessage","content":"a"}]}"#);
        write("new.json", r#"{"session_id":"new","created_at":"2025-06-01T00:00:00","messages":[]}"#);
        write("broken.json", "][");
        write("notes.txt", "ignored");

        let listing = SessionStore::new(dir.path()).list();
        let ids: Vec<&str> = listing.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(listing[1].message_count, 1);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionStore::new(dir.path().join("absent")).list().is_empty());
    }

    #[test]
    fn test_new_session_id_shape() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
