//! KeyFactExtractor — pulls confirmed order facts out of final answers.
//!
//! Driven by `FACT_FIELDS`, a declarative table of field name, label texts,
//! and value-position rule. Only AssistantTurns containing `FINAL_ANSWER_MARKER`
//! are scanned; within them each line is matched against
//! `label + (':' | '：') + value`. Later matches overwrite earlier ones.

use std::sync::OnceLock;

use regex::Regex;

use super::types::{ConversationEntry, KeyFacts};

/// Marker that identifies a finalized answer (case-sensitive).
pub const FINAL_ANSWER_MARKER: &str = "Final Answer";

/// Where the value sits after the label separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuePosition {
    /// Everything up to the end of the line.
    RestOfLine,
    /// Up to the first whitespace after the separator.
    FirstToken,
}

/// One extractable field.
#[derive(Debug, Clone, Copy)]
pub struct FactField {
    /// Canonical name used as the summary key.
    pub name: &'static str,
    /// Label texts recognized in answers, tried in order.
    pub labels: &'static [&'static str],
    pub position: ValuePosition,
}

/// The fields tracked for a quote: size, configuration, price, mount type.
pub const FACT_FIELDS: &[FactField] = &[
    FactField {
        name: "尺寸",
        labels: &["尺寸"],
        position: ValuePosition::RestOfLine,
    },
    FactField {
        name: "配置",
        labels: &["配置"],
        position: ValuePosition::RestOfLine,
    },
    FactField {
        name: "价格",
        labels: &["最终价格", "价格"],
        position: ValuePosition::RestOfLine,
    },
    FactField {
        name: "支架类型",
        labels: &["支架类型", "支架"],
        position: ValuePosition::RestOfLine,
    },
];

/// Compiled matchers, one per field, built once from `FACT_FIELDS`.
fn matchers() -> &'static [(FactField, Regex)] {
    static MATCHERS: OnceLock<Vec<(FactField, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        FACT_FIELDS
            .iter()
            .filter_map(|field| {
                let labels = field
                    .labels
                    .iter()
                    .map(|l| regex::escape(l))
                    .collect::<Vec<_>>()
                    .join("|");
                // Label starts the line, after an optional list marker and
                // emphasis: `- **价格**：2350`. `基础价格` must not match `价格`.
                let pattern = format!(r"^\s*(?:[-*•]\s+|\d+[.、)]\s*)?\**(?:{labels})\**\s*[:：]\s*\**\s*(.*)$");
                match Regex::new(&pattern) {
                    Ok(re) => Some((*field, re)),
                    Err(e) => {
                        tracing::error!(field = field.name, error = %e, "invalid fact pattern");
                        None
                    }
                }
            })
            .collect()
    })
}

/// Apply the value-position rule to the text after the separator.
fn take_value(raw: &str, position: ValuePosition) -> Option<String> {
    let value = raw.trim().trim_end_matches('*').trim();
    let value = match position {
        ValuePosition::RestOfLine => value,
        ValuePosition::FirstToken => value.split_whitespace().next().unwrap_or(""),
    };
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Extract facts from one answer text into `facts`.
fn extract_from_text(text: &str, facts: &mut KeyFacts) {
    for line in text.lines() {
        for (field, re) in matchers() {
            let Some(caps) = re.captures(line) else {
                continue;
            };
            if let Some(value) = caps.get(1).and_then(|m| take_value(m.as_str(), field.position)) {
                facts.insert(field.name, value);
            }
        }
    }
}

/// Scan every final answer in `log` and return the fields found.
///
/// Pure and idempotent; non-matching content simply contributes nothing.
pub fn extract(log: &[ConversationEntry]) -> KeyFacts {
    let mut facts = KeyFacts::new();
    for entry in log {
        if let ConversationEntry::AssistantTurn { content, .. } = entry {
            if content.contains(FINAL_ANSWER_MARKER) {
                extract_from_text(content, &mut facts);
            }
        }
    }
    facts
}

// ─── Tests ──────────────────────────────────────────────────────────────────
