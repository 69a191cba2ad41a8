//! Shared types for the agent core.
//!
//! Conversation entries, tool requests, the key-fact summary, and session
//! listings used across the ConversationLoop, ToolRouter, and SessionStore.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ─── Conversation Entries ───────────────────────────────────────────────────

/// A model-issued request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Request id, unique within one assistant batch.
    pub id: String,
    /// Tool name as exposed in the catalog.
    pub name: String,
    /// Structured arguments (a JSON object). Argument text the model sent
    /// that was not valid JSON is kept verbatim as a JSON string.
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    /// Arguments as the JSON-encoded string the model endpoint expects.
    pub fn arguments_text(&self) -> String {
        match &self.arguments {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }
}

/// One entry of the append-only conversation log.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEntry {
    /// Leading instruction (system prompt).
    Instruction { content: String },
    /// Operator / customer input.
    UserTurn { content: String },
    /// Model output. An empty `tool_requests` list marks a terminal answer.
    AssistantTurn {
        content: String,
        tool_requests: Vec<ToolRequest>,
    },
    /// Result text for the request with id `request_id`.
    ToolResult { request_id: String, content: String },
}

impl ConversationEntry {
    pub fn instruction(content: impl Into<String>) -> Self {
        Self::Instruction {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::UserTurn {
            content: content.into(),
        }
    }

    /// A terminal assistant answer (no tool requests).
    pub fn answer(content: impl Into<String>) -> Self {
        Self::AssistantTurn {
            content: content.into(),
            tool_requests: Vec::new(),
        }
    }

    pub fn tool_result(request_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            request_id: request_id.into(),
            content: content.into(),
        }
    }

    /// Text content of the entry.
    pub fn content(&self) -> &str {
        match self {
            Self::Instruction { content }
            | Self::UserTurn { content }
            | Self::AssistantTurn { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self, Self::Instruction { .. })
    }
}

/// What the model returned for one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantReply {
    pub content: String,
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantReply {
    /// Whether the reply is a plain answer with no further tool calls.
    pub fn is_final(&self) -> bool {
        self.tool_requests.is_empty()
    }

    pub fn into_entry(self) -> ConversationEntry {
        ConversationEntry::AssistantTurn {
            content: self.content,
            tool_requests: self.tool_requests,
        }
    }
}

// ─── Key Facts ──────────────────────────────────────────────────────────────

/// Confirmed order facts (size, configuration, price, mount) keyed by field name.
///
/// Keeps insertion order: overwriting a field keeps its original position,
/// new fields go to the end. Serialized as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFacts {
    entries: Vec<(String, String)>,
}

impl KeyFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` to `value`, overwriting any previous value in place.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == field) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((field, value)),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    /// Overlay every field of `other` onto `self`.
    pub fn merge(&mut self, other: &KeyFacts) {
        for (field, value) in other.iter() {
            self.insert(field, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyFacts {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut facts = KeyFacts::new();
        for (k, v) in iter {
            facts.insert(k, v);
        }
        facts
    }
}

impl Serialize for KeyFacts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyFacts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyFactsVisitor;

        impl<'de> Visitor<'de> for KeyFactsVisitor {
            type Value = KeyFacts;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field name to value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyFacts, A::Error> {
                let mut facts = KeyFacts::new();
                while let Some((key, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    let value = match value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => continue,
                        other => other.to_string(),
                    };
                    facts.insert(key, value);
                }
                Ok(facts)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<KeyFacts, E> {
                Ok(KeyFacts::new())
            }
        }

        deserializer.deserialize_any(KeyFactsVisitor)
    }
}

// ─── Sessions ───────────────────────────────────────────────────────────────

/// One row of the session picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionListing {
    pub session_id: String,
    /// Timestamp of the last save.
    pub created_at: String,
    pub message_count: usize,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
