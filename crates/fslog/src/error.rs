//! Error types for fslog
//!
//! Every failure is surfaced to the caller; nothing is retried internally.

use fslog_core::{CodecError, KeyError};
use thiserror::Error;

/// Errors that can occur in log operations
#[derive(Debug, Error)]
pub enum LogError {
    /// Open, stat or descriptor failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation on a handle after `close`
    #[error("Log handle is closed")]
    Closed,

    /// Offset key could not be normalized; no I/O was attempted
    #[error("Invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    /// Fewer bytes were available than the key promised
    #[error("Short read at {start}: expected {expected} bytes, got {actual}")]
    ShortRead { start: u64, expected: u64, actual: u64 },

    /// Payload bytes do not decode to a record
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value could not be encoded into a framable payload
    #[error("Encode error: {0}")]
    Encode(String),

    /// Append failed before the record became durable
    #[error("Write error: {0}")]
    Write(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for LogError {
    fn from(err: std::io::Error) -> Self {
        LogError::Io(err.to_string())
    }
}

impl From<CodecError> for LogError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decode(message) => LogError::Decode(message),
            CodecError::EmptyDelimiter | CodecError::NonUtf8Delimiter => {
                LogError::InvalidConfig(err.to_string())
            }
            other => LogError::Encode(other.to_string()),
        }
    }
}

impl LogError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::Write(message.into())
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
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LogError = io_err.into();
        assert!(matches!(err, LogError::Io(_)));
    }

    #[test]
    fn test_codec_error_conversion() {
        let err: LogError = CodecError::decode("bad json").into();
        assert!(matches!(err, LogError::Decode(_)));

        let err: LogError = CodecError::DelimiterInPayload.into();
        assert!(matches!(err, LogError::Encode(_)));

        let err: LogError = CodecError::EmptyDelimiter.into();
        assert!(matches!(err, LogError::InvalidConfig(_)));

        let err: LogError = CodecError::NonUtf8Delimiter.into();
        assert!(matches!(err, LogError::InvalidConfig(_)));
    }

    #[test]
    fn test_key_error_conversion() {
        let err: LogError = KeyError::Malformed("x".into()).into();
        assert!(matches!(err, LogError::InvalidKey(_)));
        assert!(err.to_string().starts_with("Invalid key"));
    }

    #[test]
    fn test_short_read_message() {
        let err = LogError::ShortRead {
            start: 10,
            expected: 8,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Short read at 10: expected 8 bytes, got 3");
    }
}
