//! Message parser for Claude Code stream-json output

use crate::error::{Result, SessionError};
use crate::types::messages::{ContentBlock, Message};

/// Parse a JSON value into a typed Message
///
/// # Errors
/// Returns `SessionError::Json` if the value is not a recognizable message
pub fn parse_message(data: serde_json::Value) -> Result<Message> {
    Ok(serde_json::from_value(data)?)
}

/// Parse one stdout line into a typed Message
///
/// Blank lines yield `Ok(None)`.
///
/// # Errors
/// Returns `SessionError::InvalidArgument` if the line is not valid JSON
pub fn parse_line(line: &str) -> Result<Option<Message>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        SessionError::invalid_argument(format!("malformed stream-json line: {e}"))
    })?;
    parse_message(value).map(Some)
}

/// Concatenated text blocks of an assistant message
///
/// Used as the turn's output when the result message carries no text.
#[must_use]
pub fn assistant_text(msg: &Message) -> Option<String> {
    let Message::Assistant { message, .. } = msg else {
        return None;
    };
    let text: Vec<&str> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join("\n"))
    }
}
