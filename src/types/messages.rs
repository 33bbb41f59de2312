//! Message-related type definitions
//!
//! Subset of the Claude Code stream-json output protocol that the process
//! controller needs: enough to find the end of a turn, the final result text
//! and the conversation id to resume later.

use serde::{Deserialize, Serialize};

// ============================================================================
// Message Types
// ============================================================================

/// Content block types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// Text content
        text: String,
    },
    /// Thinking content block (extended thinking)
    Thinking {
        /// Thinking content
        thinking: String,
        /// Signature for verification
        #[serde(default)]
        signature: String,
    },
    /// Tool use request
    ToolUse {
        /// Tool use ID
        id: String,
        /// Tool name
        name: String,
        /// Tool input parameters
        input: serde_json::Value,
    },
    /// Any block type this crate does not interpret
    #[serde(other)]
    Unknown,
}

/// Assistant message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessageContent {
    /// Model that generated the message
    #[serde(default)]
    pub model: String,
    /// Message content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// Message types emitted on stdout in stream-json mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Replayed user message or tool result
    User {
        /// Session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Assistant message
    Assistant {
        /// Message content
        message: AssistantMessageContent,
        /// Session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// System message (`init` and friends)
    System {
        /// System message subtype
        #[serde(default)]
        subtype: String,
        /// Session ID
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Result message closing a turn
    Result {
        /// Result subtype
        #[serde(default)]
        subtype: String,
        /// Total duration in milliseconds
        #[serde(default)]
        duration_ms: u64,
        /// Whether this is an error result
        #[serde(default)]
        is_error: bool,
        /// Number of conversation turns
        #[serde(default)]
        num_turns: u32,
        /// Conversation id to resume from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        /// Total cost in USD
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        /// Final result text
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    /// Partial stream event
    StreamEvent {
        /// Raw stream event data
        #[serde(default)]
        event: serde_json::Value,
    },
    /// Any message type this crate does not interpret
    #[serde(other)]
    Other,
}

impl Message {
    /// Conversation id carried by this message, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::User { session_id }
            | Self::Assistant { session_id, .. }
            | Self::System { session_id, .. }
            | Self::Result { session_id, .. } => session_id.as_deref(),
            Self::StreamEvent { .. } | Self::Other => None,
        }
    }

    /// Whether this message ends the current turn
    #[must_use]
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result { .. })
    }
}
