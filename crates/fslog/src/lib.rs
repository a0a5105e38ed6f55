//! # fslog
//!
//! An append-only, offset-addressed record log backed by a single file: a
//! minimal write-ahead-log primitive.
//!
//! Every appended record gets an [`Offset`], the `(start, length)` byte range
//! of its payload. Offsets are the only addressing there is: no index, no
//! compaction, no rotation. Records can be read back by offset or streamed
//! over a byte window, optionally following the file as it grows.
//!
//! ## Storage Format
//!
//! A flat sequence of encoded records, each followed by the delimiter
//! (CR LF unless configured otherwise), with no header, footer or checksum:
//! ```text
//! {"a":1}\r\n{"b":2}\r\n...
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use fslog::{FsLog, LogConfig, ScanOptions};
//! use futures::StreamExt;
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fslog::LogError> {
//!     let log = FsLog::open("events.log", LogConfig::default()).await?;
//!
//!     let first = log.append(&json!({"a": 1})).await?;
//!     let second = log.append(&json!({"b": 2})).await?;
//!
//!     // Point read, with the key in any accepted encoding
//!     let value: Value = log.get(first.to_string()).await?;
//!     assert_eq!(value, json!({"a": 1}));
//!
//!     // Everything from the second record on, then keep following the file
//!     let mut records = log.scan::<Value>(ScanOptions::new().gte(second).tail(true)).await?;
//!     while let Some(entry) = records.next().await {
//!         let entry = entry?;
//!         println!("{} => {}", entry.offset, entry.value);
//!     }
//!
//!     log.close().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod scan;
pub mod writer;

// Re-exports
pub use config::LogConfig;
pub use error::LogError;
pub use log::FsLog;
pub use scan::{LogEntry, ScanCloser, ScanOptions, ScanStream, ScanWindow};
pub use writer::{LogWriter, WriteAck};

// Re-export core types for convenience
pub use fslog_core::{Codec, Delimiter, JsonCodec, KeyError, Offset, OffsetKey};
