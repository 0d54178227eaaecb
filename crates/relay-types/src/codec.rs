//! UTF-8 JSON wire codec.
//!
//! Record values must be JSON objects. Anything else (invalid UTF-8, invalid
//! JSON, or a JSON scalar/array) is rejected with a [`CodecError`] so the
//! caller can skip the record instead of crashing.

use serde_json::Value;

use crate::error::{CodecError, Result};
use crate::record::DecodedMessage;

/// Decode a record value into a JSON object.
pub fn decode(bytes: &[u8]) -> Result<DecodedMessage> {
    let text = std::str::from_utf8(bytes)?;
    let value: Value = serde_json::from_str(text).map_err(CodecError::InvalidJson)?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CodecError::NotAnObject(json_kind(&other))),
    }
}

/// Encode a JSON object into record value bytes.
pub fn encode(message: &DecodedMessage) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(CodecError::Encode)
}

/// Decode an optional record key as UTF-8.
pub fn decode_key(key: Option<&[u8]>) -> Result<Option<String>> {
    key.map(|k| std::str::from_utf8(k).map(str::to_string))
        .transpose()
        .map_err(CodecError::from)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
