//! Feed Codec
//!
//! JSON encoding of registration messages and decoding of pushed events.
//! A text frame carries either one event object or an array of them; a
//! malformed element does not spoil the rest of its frame.

use crate::domain::events::{ClientMessage, ServerMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an object nor an array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the event feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// The outer result fails when the frame is not JSON at all; each inner
    /// result reports whether one element matched the event schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or array.
    pub fn decode(&self, text: &str) -> Result<Vec<Result<ServerMessage, CodecError>>, CodecError> {
        let trimmed = text.trim();

        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}"
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let elements = match value {
            serde_json::Value::Array(items) => items,
            other => vec![other],
        };

        Ok(elements
            .into_iter()
            .map(|element| serde_json::from_value(element).map_err(CodecError::from))
            .collect())
    }

    /// Encode a registration message.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }
}
