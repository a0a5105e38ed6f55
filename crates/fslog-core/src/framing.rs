//! Record framing
//!
//! On disk a record is `payload + delimiter`. [`Delimiter`] builds those units
//! on the write side; [`DelimiterChunker`] splits a byte stream back into
//! payloads on the read side, re-deriving each payload's [`Offset`] from a
//! running position instead of reading it from storage.

use std::fmt::Display;

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;

use crate::error::CodecError;
use crate::offset::Offset;

/// Default record delimiter (CR LF)
pub const DEFAULT_DELIMITER: &[u8] = b"\r\n";

/// Non-empty byte sequence terminating every record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Delimiter(Bytes);

impl Delimiter {
    /// Create a delimiter
    ///
    /// The sequence must be non-empty UTF-8 so it survives the string form
    /// used by configuration files.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(CodecError::EmptyDelimiter);
        }
        if std::str::from_utf8(&bytes).is_err() {
            return Err(CodecError::NonUtf8Delimiter);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed delimiter
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of the first occurrence of the delimiter in `haystack`
    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if haystack.len() < self.len() {
            return None;
        }
        haystack.windows(self.len()).position(|w| w == self.as_bytes())
    }

    /// Build the on-disk unit `payload + delimiter`
    ///
    /// Fails unless the first delimiter in the unit is the one appended,
    /// which also catches a payload whose tail overlaps the delimiter's head
    /// (`[1]` + `]]`).
    pub fn frame(&self, payload: &[u8]) -> Result<Bytes, CodecError> {
        let mut unit = BytesMut::with_capacity(payload.len() + self.len());
        unit.extend_from_slice(payload);
        unit.extend_from_slice(self.as_bytes());
        if self.find_in(&unit) != Some(payload.len()) {
            return Err(CodecError::DelimiterInPayload);
        }
        Ok(unit.freeze())
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self(Bytes::from_static(DEFAULT_DELIMITER))
    }
}

impl Display for Delimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl TryFrom<String> for Delimiter {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Delimiter> for String {
    fn from(delimiter: Delimiter) -> Self {
        // Lossless: `Delimiter::new` only admits UTF-8
        String::from_utf8_lossy(&delimiter.0).into_owned()
    }
}

/// One framed payload and the offset it was found at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub offset: Offset,
    pub payload: Bytes,
}

/// Stateful splitter turning raw bytes into delimiter-terminated chunks
///
/// Bytes may arrive in fragments of any size; a chunk is only produced once
/// its delimiter has been seen. Each scan owns its own chunker.
#[derive(Debug, Clone)]
pub struct DelimiterChunker {
    delimiter: Delimiter,
    /// File position of the first byte not yet emitted
    position: u64,
    /// Bytes of the buffer already known to hold no delimiter
    searched: usize,
}

impl DelimiterChunker {
    /// Create a chunker whose first byte sits at `start` in the file
    pub fn new(delimiter: Delimiter, start: u64) -> Self {
        Self {
            delimiter,
            position: start,
            searched: 0,
        }
    }

    /// File position of the next chunk
    pub fn position(&self) -> u64 {
        self.position
    }

    fn emit(&mut self, payload: Bytes, consumed: usize) -> Chunk {
        let offset = Offset::new(self.position, payload.len() as u64);
        self.position += consumed as u64;
        self.searched = 0;
        Chunk { offset, payload }
    }
}

impl Decoder for DelimiterChunker {
    type Item = Chunk;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, Self::Error> {
        let from = self.searched.min(src.len());
        match self.delimiter.find_in(&src[from..]) {
            Some(index) => {
                let end = from + index;
                let payload = src.split_to(end).freeze();
                src.advance(self.delimiter.len());
                Ok(Some(self.emit(payload, end + self.delimiter.len())))
            }
            None => {
                // A delimiter may straddle the next fragment boundary
                self.searched = src.len().saturating_sub(self.delimiter.len() - 1);
                Ok(None)
            }
        }
    }

    /// Flush at a known end of data: the unterminated remainder is a record
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, Self::Error> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len();
        let payload = src.split_to(len).freeze();
        Ok(Some(self.emit(payload, len)))
    }
}
