//! Pulling structured payloads out of free-text replies.
//!
//! Replies carry their payload in a fenced block (```json or ```cypher).
//! When no block with the requested language tag exists, the first
//! untagged fence is used instead.

use crate::error::ConversationError;
use serde::de::DeserializeOwned;

const FENCE: &str = "```";

/// Body of the first fenced block tagged `lang`, trimmed.
pub fn fenced_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    tagged_block(text, lang).or_else(|| untagged_block(text))
}

fn tagged_block<'a>(text: &'a str, lang: &str) -> Option<&'a str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let (tag, body) = split_tag(after);
        if tag.eq_ignore_ascii_case(lang) {
            let close = body.find(FENCE)?;
            return Some(body[..close].trim());
        }
        // skip this whole block so its closing fence is not read as an opener
        match body.find(FENCE) {
            Some(close) => rest = &body[close + FENCE.len()..],
            None => return None,
        }
    }
    None
}

fn untagged_block(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let (tag, body) = split_tag(after);
        let close = body.find(FENCE)?;
        if tag.is_empty() {
            return Some(body[..close].trim());
        }
        rest = &body[close + FENCE.len()..];
    }
    None
}

/// Split the info string (up to end of line) from the block body.
fn split_tag(after_fence: &str) -> (&str, &str) {
    match after_fence.find('\n') {
        Some(nl) => (after_fence[..nl].trim(), &after_fence[nl + 1..]),
        None => {
            // single-line block: ```json {"a": 1}```
            let tag_end = after_fence
                .find(|c: char| c.is_whitespace())
                .unwrap_or(after_fence.len());
            (&after_fence[..tag_end], &after_fence[tag_end..])
        }
    }
}

/// Deserialize the ```json block of `text`.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, ConversationError> {
    let block =
        fenced_block(text, "json").ok_or_else(|| ConversationError::MissingBlock("json".into()))?;
    Ok(serde_json::from_str(block)?)
}

/// Body of the ```cypher block of `text`.
pub fn extract_cypher(text: &str) -> Result<String, ConversationError> {
    fenced_block(text, "cypher")
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConversationError::MissingBlock("cypher".into()))
}
