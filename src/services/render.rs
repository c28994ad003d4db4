//! Turns step replies into the assistant text shown in the transcript.
//!
//! Outline and character results arrive as the server's serialised models:
//! a list of `(field, value)` pairs, so `chapters` sits at `[0][1]` and every
//! field of a chapter or character is the second half of a pair. Anything
//! that does not have that shape renders as nothing.

use crate::services::protocol::StepResponse;
use serde_json::Value;

const UNKNOWN_NAME: &str = "Unknown Name";
const UNKNOWN_APPEARANCE: &str = "Unknown Appearance";
const NO_BIOGRAPHY: &str = "No biography available.";

/// Assistant messages to append for a reply, in display order.
pub fn render(response: &StepResponse) -> Vec<String> {
    match response {
        StepResponse::Interview { questions, .. } => questions.clone(),
        StepResponse::Outline { outline, .. } => vec![format_outline(outline)],
        StepResponse::Characters { characters, .. } => vec![format_characters(characters)],
        StepResponse::Drafts { stories } => vec![format_drafts(stories)],
        StepResponse::Unrecognized { .. } => Vec::new(),
    }
}

pub fn format_outline(outline: &Value) -> String {
    entries(outline)
        .iter()
        .map(|chapter| {
            format!(
                "Chapter {}: {}",
                field(chapter, 0).map(text).unwrap_or_default(),
                field(chapter, 1).map(text).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_characters(characters: &Value) -> String {
    entries(characters)
        .iter()
        .map(|character| {
            format!(
                "Name: {}\nAppearance: {}\nBiography: {}",
                or_default(field(character, 0), UNKNOWN_NAME),
                or_default(field(character, 1), UNKNOWN_APPEARANCE),
                or_default(field(character, 2), NO_BIOGRAPHY)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn format_drafts(stories: &[String]) -> String {
    stories.join("\n")
}

/// The list held by the first `(field, list)` pair of a serialised model.
fn entries(model: &Value) -> &[Value] {
    model
        .get(0)
        .and_then(|pair| pair.get(1))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Value of the `index`-th `(field, value)` pair.
fn field(model: &Value, index: usize) -> Option<&Value> {
    model.get(index).and_then(|pair| pair.get(1))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn or_default(value: Option<&Value>, fallback: &str) -> String {
    match value.map(text) {
        Some(s) if !s.is_empty() => s,
        _ => fallback.to_string(),
    }
}
