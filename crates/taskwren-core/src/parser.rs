//! Completion parsing.
//!
//! Pure function from model output text to either a final reply or a single
//! proposed tool call. Near-miss formatting is tolerated: fenced code blocks,
//! surrounding prose, unquoted or single-quoted keys, trailing commas, and
//! arguments delivered as a JSON-encoded string. Failures are returned as
//! data: the failure text is fed into the next correction prompt, so it must
//! describe the problem, not panic over it.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::tool::ToolCall;

#[derive(Debug)]
pub enum ParsedOutput {
    /// Plain text with no evident call intent: the final reply.
    Reply(String),
    /// The first structured call found in the completion.
    Call(ToolCall),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reason: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

fn tool_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']?tool["']?\s*:"#).expect("static regex"))
}

fn name_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"["']?name["']?\s*:"#).expect("static regex"))
}

fn args_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["']?(arguments|args|parameters)["']?\s*:"#).expect("static regex")
    })
}

/// An object is a call candidate when it names a tool directly, or uses the
/// `name` + `arguments` shape some models prefer.
fn looks_like_call(text: &str) -> bool {
    tool_key_re().is_match(text) || (name_key_re().is_match(text) && args_key_re().is_match(text))
}

fn unquoted_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)"#).expect("static regex")
    })
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#",(\s*[}\]])"#).expect("static regex"))
}

pub fn parse_completion(text: &str) -> Result<ParsedOutput, ParseFailure> {
    let stripped = strip_reasoning(text);
    let stripped = stripped.trim();

    let mut candidates: Vec<String> = fenced_blocks(stripped);
    candidates.push(stripped.to_string());

    for candidate in &candidates {
        for object in balanced_objects(candidate) {
            if !looks_like_call(object) {
                continue;
            }
            if let Some(value) = parse_lenient(object) {
                return extract_call(&value).map(ParsedOutput::Call);
            }
        }
    }

    if call_intended(stripped) {
        return Err(ParseFailure::new(
            "the reply looks like a tool call but is not a well-formed JSON object \
             with \"tool\" and \"arguments\" keys",
        ));
    }

    Ok(ParsedOutput::Reply(stripped.to_string()))
}

/// Reasoning models wrap deliberation in `<think>` tags; none of it is meant
/// for the user or the call parser.
fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            Some(open) => {
                out.push_str(&rest[..open]);
                match rest[open..].find("</think>") {
                    Some(close) => {
                        rest = &rest[open + close + "</think>".len()..];
                    }
                    None => break,
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Contents of ``` fenced blocks, language tag dropped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut sections = text.split("```");
    // Everything at an odd index is inside a fence.
    let mut inside = false;
    while let Some(section) = sections.next() {
        if inside {
            let body = match section.split_once('\n') {
                Some((first_line, rest)) if first_line.trim().chars().all(char::is_alphanumeric) => {
                    rest
                }
                _ => section,
            };
            blocks.push(body.trim().to_string());
        }
        inside = !inside;
    }
    blocks
}

/// Top-level balanced `{…}` spans, string-aware.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
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
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// Parse with escalating repairs: as-is, then trailing commas removed, then
/// unquoted keys quoted, then single quotes converted as a last resort.
fn parse_lenient(object: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(object) {
        return Some(value);
    }

    let no_trailing = trailing_comma_re().replace_all(object, "$1");
    if let Ok(value) = serde_json::from_str::<Value>(&no_trailing) {
        return Some(value);
    }

    let quoted_keys = unquoted_key_re().replace_all(&no_trailing, "$1\"$2\"$3");
    if let Ok(value) = serde_json::from_str::<Value>(&quoted_keys) {
        return Some(value);
    }

    if quoted_keys.contains('\'') {
        let requoted = quoted_keys.replace('\'', "\"");
        if let Ok(value) = serde_json::from_str::<Value>(&requoted) {
            return Some(value);
        }
    }

    None
}

fn extract_call(value: &Value) -> Result<ToolCall, ParseFailure> {
    let object = value
        .as_object()
        .ok_or_else(|| ParseFailure::new("the tool call is not a JSON object"))?;

    let tool = object
        .get("tool")
        .or_else(|| object.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| ParseFailure::new("the \"tool\" key is missing or not a string"))?
        .trim()
        .to_string();

    if tool.is_empty() {
        return Err(ParseFailure::new("the \"tool\" key is empty"));
    }

    let raw_args = object
        .get("arguments")
        .or_else(|| object.get("args"))
        .or_else(|| object.get("parameters"));

    let arguments: Map<String, Value> = match raw_args {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        // Some models double-encode: {"arguments": "{\"title\": \"x\"}"}.
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(ParseFailure::new(
                    "\"arguments\" is a string that does not contain a JSON object",
                ))
            }
        },
        Some(_) => {
            return Err(ParseFailure::new(
                "\"arguments\" must be a JSON object of parameter names to values",
            ))
        }
    };

    Ok(ToolCall { tool, arguments })
}

fn call_intended(text: &str) -> bool {
    tool_key_re().is_match(text) || (text.contains('{') && args_key_re().is_match(text))
}
