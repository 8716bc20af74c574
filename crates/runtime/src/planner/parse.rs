//! Extraction of the structured workflow payload from planner output.
//!
//! Planner backends return free-form text with no guaranteed format
//! compliance. Extraction picks a single candidate region, trying in order:
//! a ```json-tagged fence, any fenced block (language tag stripped), and
//! finally a scan from the first `{` to the last `}`.

use serde_json::Value;

use crate::{Error, Result};

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Extract and parse the structured document embedded in planner text.
pub fn extract_structured_payload(text: &str) -> Result<Value> {
    let candidate = find_candidate(text).ok_or_else(|| {
        Error::WorkflowFormat("no structured payload found in planner response".to_string())
    })?;

    serde_json::from_str(candidate.trim())
        .map_err(|e| Error::WorkflowFormat(format!("planner payload is not valid JSON: {e}")))
}

fn find_candidate(text: &str) -> Option<&str> {
    if let Some(block) = fenced_block(text, JSON_FENCE) {
        return Some(block);
    }
    if let Some(block) = fenced_block(text, FENCE) {
        // A generic fence may open with a language tag on the same line.
        return Some(strip_first_line_tag(block));
    }
    brace_span(text)
}

fn fenced_block<'a>(text: &'a str, open: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let rest = &text[start..];
    match rest.find(FENCE) {
        Some(end) => Some(&rest[..end]),
        None => Some(rest),
    }
}

fn strip_first_line_tag(block: &str) -> &str {
    let trimmed = block.trim_start_matches([' ', '\t']);
    match trimmed.split_once('\n') {
        Some((first_line, rest)) if !first_line.trim_start().starts_with('{') => rest,
        _ => block,
    }
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}
