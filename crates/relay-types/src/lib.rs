//! Shared types for topic-relay.
//!
//! This crate holds the data model that flows through a relay:
//!
//! ```text
//! RawRecord --decode--> DecodedMessage --handler--> ForwardInstruction --encode--> broker
//!     \
//!      `--(after successful dispatch)--> CommitMarker
//! ```
//!
//! # Modules
//!
//! - [`binding`] - topic/consumer group pairs that identify consumption loops
//! - [`record`] - records pulled from the broker, commit markers and forward instructions
//! - [`codec`] - the UTF-8 JSON wire encoding
//! - [`error`] - codec errors

pub mod binding;
pub mod codec;
pub mod error;
pub mod record;

pub use binding::TopicBinding;
pub use codec::{decode, decode_key, encode};
pub use error::{CodecError, Result};
pub use record::{
    CommitMarker, DecodedMessage, ForwardInstruction, RawRecord, DEFAULT_KEY_FIELD,
};
