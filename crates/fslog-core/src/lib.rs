//! # fslog core
//!
//! Pure types shared by the fslog storage crate. Nothing here touches the
//! filesystem.
//!
//! ## Key Types
//!
//! - [`Offset`]: `(start, length)` byte-range key of one record's payload
//! - [`OffsetKey`]: the three accepted key encodings, normalized by [`OffsetKey::normalize`]
//! - [`Codec`] / [`JsonCodec`]: payload encoding
//! - [`Delimiter`]: record terminator, CR LF by default
//! - [`DelimiterChunker`]: stateful splitter that re-derives offsets while reading

pub mod codec;
pub mod error;
pub mod framing;
pub mod offset;

pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, KeyError};
pub use framing::{Chunk, DEFAULT_DELIMITER, Delimiter, DelimiterChunker};
pub use offset::{Offset, OffsetKey};
