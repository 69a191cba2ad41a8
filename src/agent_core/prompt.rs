//! PromptComposer — prepends confirmed key facts to the static instruction.

use super::types::KeyFacts;

/// Separator between the fact header and the static instruction.
const HEADER_SEPARATOR: &str = "\n\n";

/// Build the effective leading instruction for one turn.
///
/// With no facts the static instruction is returned unchanged. Otherwise a
/// header of `<field>：<value>` lines (in insertion order) comes first,
/// followed by the untouched static instruction.
pub fn compose(static_instruction: &str, facts: &KeyFacts) -> String {
    if facts.is_empty() {
        return static_instruction.to_string();
    }

    let header = facts
        .iter()
        .map(|(field, value)| format!("{field}：{value}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{header}{HEADER_SEPARATOR}{static_instruction}")
}
