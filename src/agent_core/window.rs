//! ContextWindower — bounds the conversation log sent to the model.
//!
//! The first Instruction entry is pinned and exempt from the budget; the
//! `size` most recent non-instruction entries follow it. Truncation can cut
//! an AssistantTurn away from its ToolResults, so a post-filter drops every
//! ToolResult whose request id no retained AssistantTurn issued.

use std::collections::HashSet;

use super::types::ConversationEntry;

/// Default number of non-instruction entries kept per prompt.
pub const DEFAULT_WINDOW_SIZE: usize = 15;

/// Reduce `log` to at most `size + 1` entries with a consistent tool pairing.
///
/// Only the first Instruction is kept; any later Instruction entries are not
/// part of the view.
pub fn window(log: &[ConversationEntry], size: usize) -> Vec<ConversationEntry> {
    let instruction = log.iter().find(|e| e.is_instruction());
    let others: Vec<&ConversationEntry> = log.iter().filter(|e| !e.is_instruction()).collect();

    let start = others.len().saturating_sub(size);
    let mut windowed: Vec<ConversationEntry> = Vec::with_capacity(size + 1);
    if let Some(instr) = instruction {
        windowed.push(instr.clone());
    }
    windowed.extend(others[start..].iter().map(|e| (*e).clone()));

    drop_orphan_results(windowed)
}

/// Remove ToolResults whose originating request is absent from `entries`.
fn drop_orphan_results(entries: Vec<ConversationEntry>) -> Vec<ConversationEntry> {
    let issued: HashSet<String> = entries
        .iter()
        .filter_map(|e| match e {
            ConversationEntry::AssistantTurn { tool_requests, .. } => Some(tool_requests),
            _ => None,
        })
        .flatten()
        .map(|r| r.id.clone())
        .collect();

    let before = entries.len();
    let kept: Vec<ConversationEntry> = entries
        .into_iter()
        .filter(|e| match e {
            ConversationEntry::ToolResult { request_id, .. } => issued.contains(request_id),
            _ => true,
        })
        .collect();

    if kept.len() < before {
        tracing::debug!(dropped = before - kept.len(), "dropped orphaned tool results from window");
    }
    kept
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::ToolRequest;

    fn call(id: &str) -> ConversationEntry {
        ConversationEntry::AssistantTurn {
            content: String::new(),
            tool_requests: vec![ToolRequest {
                id: id.into(),
                name: "query".into(),
                arguments: serde_json::json!({"sql": "SELECT 1"}),
            }],
        }
    }

    fn chat_log(n: usize) -> Vec<ConversationEntry> {
        let mut log = vec![ConversationEntry::instruction("system")];
        for i in 0..n {
            if i % 2 == 0 {
                log.push(ConversationEntry::user(format!("q{i}")));
            } else {
                log.push(ConversationEntry::answer(format!("a{i}")));
            }
        }
        log
    }

    #[test]
    fn test_short_log_unchanged() {
        let log = chat_log(4);
        assert_eq!(window(&log, 10), log);
    }

    #[test]
    fn test_forty_entries_window_fifteen() {
        // 1 instruction + 39 others = 40 entries.
        let log = chat_log(39);
        assert_eq!(log.len(), 40);

        let out = window(&log, 15);
        assert_eq!(out.len(), 16);
        assert!(out[0].is_instruction());
        assert_eq!(out[1..], log[25..]);
    }

    #[test]
    fn test_instruction_pinned_when_not_first() {
        let log = vec![
            ConversationEntry::user("hello"),
            ConversationEntry::instruction("system"),
            ConversationEntry::answer("hi"),
        ];
        let out = window(&log, 1);
        assert_eq!(out, vec![ConversationEntry::instruction("system"), ConversationEntry::answer("hi")]);
    }

    #[test]
    fn test_only_first_instruction_kept() {
        let log = vec![
            ConversationEntry::instruction("first"),
            ConversationEntry::user("q"),
            ConversationEntry::instruction("second"),
        ];
        let out = window(&log, 5);
        assert_eq!(out, vec![ConversationEntry::instruction("first"), ConversationEntry::user("q")]);
    }

    #[test]
    fn test_orphaned_tool_result_dropped() {
        let log = vec![
            ConversationEntry::instruction("system"),
            ConversationEntry::user("price?"),
            call("call_1"),
            ConversationEntry::tool_result("call_1", "2350"),
            ConversationEntry::answer("Final Answer: 2350"),
        ];
        // Window of 2 keeps the tool result and the answer but not the call.
        let out = window(&log, 2);
        assert_eq!(
            out,
            vec![ConversationEntry::instruction("system"), ConversationEntry::answer("Final Answer: 2350")]
        );
    }

    #[test]
    fn test_matched_pair_survives() {
        let log = vec![
            ConversationEntry::instruction("system"),
            ConversationEntry::user("price?"),
            call("call_1"),
            ConversationEntry::tool_result("call_1", "2350"),
        ];
        let out = window(&log, 2);
        assert_eq!(out.len(), 3);
        assert!(matches!(out[2], ConversationEntry::ToolResult { .. }));
    }

    #[test]
    fn test_no_instruction() {
        let log = vec![ConversationEntry::user("a"), ConversationEntry::user("b"), ConversationEntry::user("c")];
        assert_eq!(window(&log, 2), log[1..].to_vec());
    }

    #[test]
    fn test_bound_and_pairing_hold_for_all_sizes() {
        let mut log = vec![ConversationEntry::instruction("system")];
        for i in 0..12 {
            log.push(ConversationEntry::user(format!("q{i}")));
            log.push(call(&format!("c{i}a")));
            log.push(ConversationEntry::tool_result(format!("c{i}a"), "r"));
            log.push(ConversationEntry::tool_result(format!("c{i}a"), "r2"));
            log.push(ConversationEntry::answer(format!("a{i}")));
        }

        for size in 0..log.len() + 2 {
            let out = window(&log, size);
            assert!(out.len() <= size + 1, "size {size}: got {}", out.len());

            let ids: HashSet<&str> = out
                .iter()
                .filter_map(|e| match e {
                    ConversationEntry::AssistantTurn { tool_requests, .. } => Some(tool_requests),
                    _ => None,
                })
                .flatten()
                .map(|r| r.id.as_str())
                .collect();
            for e in &out {
                if let ConversationEntry::ToolResult { request_id, .. } = e {
                    assert!(ids.contains(request_id.as_str()), "orphan {request_id} at size {size}");
                }
            }
        }
    }
}
