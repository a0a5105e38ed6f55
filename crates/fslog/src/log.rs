//! Log handle
//!
//! [`FsLog`] owns the append descriptor of one file, the durable byte length
//! of that file (`tail`) and the record format (codec + delimiter).

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fslog_core::{Codec, Delimiter, JsonCodec, Offset, OffsetKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use crate::config::LogConfig;
use crate::error::LogError;

/// Append-only, offset-addressed record log backed by a single file
///
/// Appends are serialized through one write path, so offsets are assigned in
/// completion order and never overlap. Point reads and scans open their own
/// read descriptors and never contend with the writer.
#[derive(Debug)]
pub struct FsLog<C: Codec = JsonCodec> {
    /// Path of the backing file
    path: PathBuf,
    /// Configuration
    config: LogConfig,
    /// Payload codec, shared with scan tasks
    pub(crate) codec: Arc<C>,
    /// Append descriptor; the mutex is the write queue, `None` once closed
    writer: Mutex<Option<File>>,
    /// Durable end of data, published to tailing scans
    tail: watch::Sender<u64>,
    /// Set by `close`
    closed: AtomicBool,
}

impl FsLog<JsonCodec> {
    /// Open a JSON log at `path`, creating the file if it does not exist
    pub async fn open(path: impl AsRef<Path>, config: LogConfig) -> Result<Self, LogError> {
        Self::open_with_codec(path, config, JsonCodec).await
    }
}

impl<C: Codec> FsLog<C> {
    /// Open a log with a custom payload codec
    ///
    /// `tail` is restored from the current file size. Failures other than the
    /// file not existing yet (permission denied, path is a directory, ...)
    /// surface as [`LogError::Io`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_with_codec(
        path: impl AsRef<Path>,
        config: LogConfig,
        codec: C,
    ) -> Result<Self, LogError> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|e| LogError::io(format!("{}: {}", path.display(), e)))?;

        let tail = file.metadata().await?.len();

        info!(path = %path.display(), tail = tail, "Opened log");

        Ok(Self {
            path,
            config,
            codec: Arc::new(codec),
            writer: Mutex::new(Some(file)),
            tail: watch::Sender::new(tail),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn delimiter(&self) -> &Delimiter {
        &self.config.delimiter
    }

    /// Exclusive end of all data written through this handle, delimiters included
    pub fn tail(&self) -> u64 {
        *self.tail.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), LogError> {
        if self.is_closed() {
            return Err(LogError::Closed);
        }
        Ok(())
    }

    /// Receiver notified whenever `tail` advances
    pub(crate) fn subscribe_tail(&self) -> watch::Receiver<u64> {
        self.tail.subscribe()
    }

    /// Append one record and return its offset
    ///
    /// The offset is returned only once the unit has been written and flushed;
    /// any read started afterwards observes it. On failure `tail` is unchanged
    /// and bytes of a partially written unit are truncated away.
    #[instrument(skip_all)]
    pub async fn append<T: Serialize + ?Sized>(&self, value: &T) -> Result<Offset, LogError> {
        self.ensure_open()?;

        let payload = self.codec.encode(value)?;
        let unit = self.config.delimiter.frame(&payload)?;

        let mut guard = self.writer.lock().await;
        let file = guard.as_mut().ok_or(LogError::Closed)?;
        let start = self.tail();

        if let Err(e) = self.write_unit(file, &unit).await {
            warn!(start = start, error = %e, "Append failed, discarding partial write");
            if let Err(rollback) = file.set_len(start).await {
                warn!(start = start, error = %rollback, "Failed to truncate partial write");
            }
            return Err(LogError::write(e.to_string()));
        }

        let offset = Offset::new(start, payload.len() as u64);
        let tail = start + unit.len() as u64;
        self.tail.send_replace(tail);

        debug!(start = offset.start, length = offset.length, tail = tail, "Appended record");
        Ok(offset)
    }

    async fn write_unit(&self, file: &mut File, unit: &[u8]) -> std::io::Result<()> {
        file.write_all(unit).await?;
        file.flush().await?;
        if self.config.sync_on_write {
            file.sync_data().await?;
        }
        Ok(())
    }

    /// Read the record at `key`
    ///
    /// `key` may be any [`OffsetKey`] encoding; malformed keys fail before
    /// the file is touched.
    #[instrument(skip_all)]
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: impl Into<OffsetKey>,
    ) -> Result<T, LogError> {
        let offset = key.into().normalize()?;
        let payload = self.read_payload(offset).await?;
        self.codec
            .decode(&payload)
            .map_err(|e| LogError::decode(format!("record at {}: {}", offset, e)))
    }

    /// Read the raw payload bytes at `key`
    pub async fn get_raw(&self, key: impl Into<OffsetKey>) -> Result<Vec<u8>, LogError> {
        let offset = key.into().normalize()?;
        self.read_payload(offset).await
    }

    async fn read_payload(&self, offset: Offset) -> Result<Vec<u8>, LogError> {
        self.ensure_open()?;

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset.start)).await?;

        let mut payload = Vec::new();
        let read = (&mut file)
            .take(offset.length)
            .read_to_end(&mut payload)
            .await? as u64;

        if read < offset.length {
            debug!(offset = %offset, read = read, "Short read");
            return Err(LogError::ShortRead {
                start: offset.start,
                expected: offset.length,
                actual: read,
            });
        }
        Ok(payload)
    }

    /// Flush appended data to disk
    pub async fn sync(&self) -> Result<(), LogError> {
        let mut guard = self.writer.lock().await;
        let file = guard.as_mut().ok_or(LogError::Closed)?;
        file.sync_data().await?;
        Ok(())
    }

    /// Release the append descriptor
    ///
    /// Later `append`, `get` and `scan` calls fail with [`LogError::Closed`].
    /// Scans already running are not affected. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), LogError> {
        let mut guard = self.writer.lock().await;
        self.closed.store(true, Ordering::Release);
        if let Some(file) = guard.take() {
            file.sync_all().await?;
            info!(path = %self.path.display(), tail = self.tail(), "Closed log");
        }
        Ok(())
    }
}
