//! Error types for fslog-core

use thiserror::Error;

/// Errors raised while normalizing an offset key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key does not have one of the accepted shapes
    #[error("Malformed key {0:?}: expected \"START_LENGTH\", [START, LENGTH] or {{start, length}}")]
    Malformed(String),

    /// A key component is not a non-negative integer
    #[error("Key component {0:?} is not a non-negative integer")]
    NotAnInteger(String),

    /// `start + length` does not fit in a byte position
    #[error("Key overflows the addressable range: start {start}, length {length}")]
    Overflow { start: u64, length: u64 },
}

/// Errors raised by a payload codec
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// The encoded payload contains the record delimiter and cannot be framed
    #[error("Encoded payload contains the record delimiter")]
    DelimiterInPayload,

    #[error("Record delimiter must not be empty")]
    EmptyDelimiter,

    #[error("Record delimiter must be valid UTF-8")]
    NonUtf8Delimiter,
}

impl CodecError {
    /// Create a new Encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    /// Create a new Decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_key_message() {
        let err = KeyError::Malformed("abc".into());
        assert!(err.to_string().contains("\"abc\""));
        assert!(err.to_string().contains("START_LENGTH"));
    }

    #[test]
    fn test_codec_error_constructors() {
        assert!(matches!(CodecError::encode("x"), CodecError::Encode(_)));
        assert!(matches!(CodecError::decode("y"), CodecError::Decode(_)));
    }
}
