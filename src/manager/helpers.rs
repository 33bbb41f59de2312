//! Helper functions for rendering session output
//!
//! Pure functions, kept apart from the dispatcher so they can be tested
//! without a process.

use crate::process::Delivery;

/// Stands in for a turn that produced no text
pub(super) const NO_OUTPUT: &str = "(Claude Code produced no output)";

/// Final text for a delivered turn
///
/// A turn the process itself flagged as failed is still a successful
/// delivery; its text is prefixed so the caller can tell.
pub(super) fn format_output(delivery: &Delivery) -> String {
    let text = if delivery.output.trim().is_empty() {
        NO_OUTPUT
    } else {
        delivery.output.as_str()
    };
    if delivery.is_error {
        format!("Error:\n{text}")
    } else {
        text.to_string()
    }
}

/// Cut `output` to at most `max_chars` characters
///
/// Counts characters, not bytes, so multi-byte text is never split inside a
/// code point.
pub(super) fn truncate_output(output: String, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output;
    }

    let cut = output
        .char_indices()
        .nth(max_chars)
        .map_or(output.len(), |(idx, _)| idx);
    format!("{}\n\n... (truncated, {total} chars total)", &output[..cut])
}
