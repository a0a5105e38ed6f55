//! Payload codecs
//!
//! A codec turns one record into one self-describing encoded unit. The log
//! frames units with a delimiter, so a codec's output must never contain it;
//! [`Delimiter::frame`](crate::Delimiter::frame) enforces that at append time.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Encoding used for record payloads
pub trait Codec: Send + Sync + 'static {
    /// Encode a value into payload bytes
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode payload bytes back into a value
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Compact JSON text encoding
///
/// JSON escapes control characters inside strings and compact output has no
/// raw line breaks, so it is safe with the default CR LF delimiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(e.to_string()))
    }
}
