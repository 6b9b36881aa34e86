//! Structured extraction: recovers a JSON value from noisy model output.
//!
//! Model servers wrap completions in an envelope (`{"response": ...}`), models
//! prefix or suffix their JSON with chatter, and some responses arrive
//! double-encoded. Everything here is decided once, producing a
//! [`ModelOutput`] the stage functions can match on.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::llm::client::ModelOutput;

/// Envelope key used by Ollama-style servers.
const ENVELOPE_KEY: &str = "response";

/// Greedy first `{...}` or `[...]` span.
static GREEDY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}|\[.*\]").expect("static regex"));

/// Interpret a raw response body.
///
/// Structured requests run the full extraction ladder. Text requests only
/// unwrap the server envelope so that bracketed prose stays prose.
pub fn interpret(raw: &str, structured: bool) -> ModelOutput {
    if structured {
        interpret_structured(raw)
    } else {
        interpret_text(raw)
    }
}

fn interpret_structured(text: &str) -> ModelOutput {
    let trimmed = text.trim();
    match extract_json(trimmed) {
        Some(value) => unwrap_structured(value),
        None => ModelOutput::PlainText(trimmed.to_string()),
    }
}

fn unwrap_structured(value: Value) -> ModelOutput {
    match value {
        Value::Object(mut map) if map.contains_key(ENVELOPE_KEY) => {
            match map.remove(ENVELOPE_KEY) {
                Some(Value::String(inner)) => interpret_structured(&inner),
                Some(Value::Null) | None => ModelOutput::PlainText(String::new()),
                Some(inner) => unwrap_structured(inner),
            }
        }
        // Double-encoded: the JSON value is itself a string of JSON.
        Value::String(inner) => interpret_structured(&inner),
        other => ModelOutput::Structured(other),
    }
}

fn interpret_text(text: &str) -> ModelOutput {
    let trimmed = text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut map)) if map.contains_key(ENVELOPE_KEY) => {
            match map.remove(ENVELOPE_KEY) {
                Some(Value::String(inner)) => interpret_text(&inner),
                Some(Value::Null) | None => ModelOutput::PlainText(String::new()),
                Some(inner @ (Value::Object(_) | Value::Array(_))) => unwrap_structured(inner),
                Some(other) => ModelOutput::PlainText(other.to_string()),
            }
        }
        Ok(Value::String(inner)) => ModelOutput::PlainText(inner.trim().to_string()),
        _ => ModelOutput::PlainText(trimmed.to_string()),
    }
}

/// Recover a JSON value from `text`, or `None` if nothing parses.
///
/// 1. the whole trimmed text;
/// 2. the shortest balanced span starting at each `{` / `[`, in order;
/// 3. the greedy first `{...}` / `[...]` span.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    for (start, _) in text.match_indices(['{', '[']) {
        if let Some(span) = balanced_span(text, start)
            && let Ok(value) = serde_json::from_str(span)
        {
            return Some(value);
        }
    }

    GREEDY_SPAN
        .find(text)
        .and_then(|m| serde_json::from_str(m.as_str()).ok())
}

/// The shortest bracket-balanced span of `text` starting at byte `start`.
///
/// Brackets inside JSON string literals are ignored. A mismatched closer
/// (`{]` or `[}`) abandons the candidate.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let open = stack.pop()?;
                let matched = matches!((open, b), (b'{', b'}') | (b'[', b']'));
                if !matched {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}
