//! Argument extraction for local tools.
//!
//! Models sometimes send numbers as strings (`"2350"`) or omit optional
//! fields entirely; these helpers accept both shapes.

use serde_json::Value;

use crate::agent_core::errors::AgentError;

fn invalid(tool: &str, reason: String) -> AgentError {
    AgentError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    }
}

/// A required, non-empty string field.
pub fn required_str<'a>(tool: &str, args: &'a Value, field: &str) -> Result<&'a str, AgentError> {
    match args.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) => Err(invalid(tool, format!("'{field}' must not be empty"))),
        Some(_) => Err(invalid(tool, format!("'{field}' must be a string"))),
        None => Err(invalid(tool, format!("missing required field: '{field}'"))),
    }
}

/// An optional string field; empty strings and `null` count as absent.
pub fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// A number given as a JSON number or a numeric string.
pub fn number(tool: &str, args: &Value, field: &str, default: Option<f64>) -> Result<f64, AgentError> {
    match args.get(field) {
        None | Some(Value::Null) => default.ok_or_else(|| invalid(tool, format!("missing required field: '{field}'"))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| invalid(tool, format!("'{field}' is out of range"))),
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('元')
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(tool, format!("'{field}' is not a number: {s}"))),
        Some(other) => Err(invalid(tool, format!("'{field}' must be a number, got {other}"))),
    }
}
