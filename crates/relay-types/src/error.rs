//! Error types for the wire codec.

use thiserror::Error;

/// Errors that can occur while decoding or encoding a record payload.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
