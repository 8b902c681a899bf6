//! Structured parsing of oracle replies.
//!
//! Replies are supposed to be JSON but frequently arrive wrapped in prose or
//! markdown fences. Each stage of the chain is tried in order:
//!
//! 1. **Strict**: the whole reply parses as JSON.
//! 2. **Embedded**: a fenced block or the outermost `{...}` / `[...]` span parses.
//! 3. **Labelled**: `Key: value` lines (handled by the caller via [`labelled_value`]).
//! 4. **Default**: the caller's safe default.
//!
//! Every stage returns a typed value; nothing here panics or raises.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid fenced-block regex")
});

/// Which stage of the degradation chain produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStage {
    Strict,
    Embedded,
    Labelled,
}

impl std::fmt::Display for ParseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParseStage::Strict => "strict",
            ParseStage::Embedded => "embedded",
            ParseStage::Labelled => "labelled",
        };
        f.write_str(s)
    }
}

/// Parse a reply as JSON, falling back to embedded JSON.
pub fn json_value(text: &str) -> Option<(Value, ParseStage)> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some((value, ParseStage::Strict));
    }

    for caps in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(body) = caps.get(1)
            && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
        {
            return Some((value, ParseStage::Embedded));
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close))
            && start < end
            && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        {
            return Some((value, ParseStage::Embedded));
        }
    }

    None
}

/// A non-empty string field of a JSON object.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// A numeric field, accepting numbers and numeric strings.
pub fn f64_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A boolean field, accepting booleans and yes/no strings.
pub fn bool_field(value: &Value, key: &str) -> Option<bool> {
    match value.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => yes_no(s),
        _ => None,
    }
}

/// An array of strings; objects with a `text` field are accepted too.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Object(_) => str_field(item, "text"),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Value of the first `Label: value` line whose label matches (case-insensitive).
pub fn labelled_value(text: &str, labels: &[&str]) -> Option<String> {
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '#', ' ']);
        let Some((label, rest)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().trim_matches('*').to_lowercase();
        if labels.iter().any(|l| label == *l) {
            let value = rest.trim().trim_matches('"').trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Interpret a free-text yes/no reply. `None` when it says neither.
pub fn yes_no(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    let first = lower
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())?;
    match first {
        "yes" | "true" | "unique" | "y" => Some(true),
        "no" | "false" | "n" | "ambiguous" => Some(false),
        _ => None,
    }
}
