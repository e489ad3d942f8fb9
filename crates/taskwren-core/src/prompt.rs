//! System prompt assembly.
//!
//! The prompt is rebuilt on every completion so the current datetime stays
//! fresh, and carries the serialized tool catalog plus the call format the
//! parser expects. Correction hints reference the exact failure so the model
//! can repair its own output.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::DispatchError;

const GUIDELINES: &str = "\
You are a personal assistant managing the user's calendar and tasks.

## Guidelines

**Clarify before acting:**
- If details are ambiguous or missing (time, duration, specific date), ask the user first.
- Don't assume times - ask \"What time?\" if not specified.

**Read before write:**
- ALWAYS call list_tasks or list_events BEFORE editing or deleting.
- Never use ids from memory - always fetch fresh ones.

**After actions complete:**
- Acknowledge what was done naturally and offer related help.

Be conversational and helpful.";

const CALL_FORMAT: &str = "\
## Calling a tool

To call a tool, reply with a single JSON object and nothing else:
{\"tool\": \"<tool name>\", \"arguments\": {<parameter>: <value>, ...}}

Call at most one tool per reply. When no tool is needed, reply with plain text.";

/// Full system prompt: guidelines, clock, and the tool catalog.
pub fn system_prompt(now: DateTime<Utc>, catalog: &Value) -> String {
    format!(
        "{GUIDELINES}\n\nCurrent date and time: {}\n\n{CALL_FORMAT}\n\n## Available tools\n\n{}",
        now.format("%Y-%m-%d %H:%M (%A)"),
        serde_json::to_string_pretty(catalog).unwrap_or_else(|_| "[]".to_string()),
    )
}

/// System prompt for forced finalization: no tools on offer.
pub fn finalize_prompt(now: DateTime<Utc>) -> String {
    format!(
        "{GUIDELINES}\n\nCurrent date and time: {}",
        now.format("%Y-%m-%d %H:%M (%A)"),
    )
}

/// Correction hint after a parse failure.
pub fn parse_correction(reason: &str) -> String {
    format!(
        "Your previous reply could not be processed: {reason}. \
         If you meant to call a tool, reply with exactly one JSON object of the form \
         {{\"tool\": \"<name>\", \"arguments\": {{...}}}} and no other text. \
         Otherwise reply in plain text."
    )
}

/// Correction hint after a validation failure.
pub fn validation_correction(error: &DispatchError) -> String {
    format!(
        "Your tool call was rejected: {error}. \
         Fix the call and send it again as a single JSON object, \
         or reply in plain text if no tool is needed."
    )
}

/// Instruction used when the tool-round budget is exhausted.
pub fn finalize_instruction() -> String {
    "Summarize the outcome for the user based on everything gathered so far. \
     Do not call any more tools; reply in plain text only."
        .to_string()
}
