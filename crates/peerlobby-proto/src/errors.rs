//! Protocol error types.

use thiserror::Error;

/// Result alias for wire encoding and decoding.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire messages.
///
/// None of these are fatal to a session. A receiver logs the error, drops the
/// frame, and processes the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is a JSON object without a string `type` field.
    #[error("message has no type field")]
    MissingType,

    /// Frame carries a `type` this version does not understand.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Frame is not valid JSON, or does not match the schema for its type.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Message could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// True if the frame was well-formed but of a kind newer peers may send.
    ///
    /// Receivers log these at a lower level than genuinely broken frames.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}
