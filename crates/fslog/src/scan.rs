//! Range and tail streaming
//!
//! A scan reads a byte window of the log file through a [`DelimiterChunker`]
//! and yields `{offset, value}` pairs. Offsets are re-derived from the
//! window start while reading, never looked up.
//!
//! The reading runs in a tokio task that feeds a bounded channel, so the file
//! is released as soon as the scan is closed, even if the consumer never
//! polls again. With `tail` set the task does not stop at the end of the file:
//! it waits for the handle to report new appends (or for the poll interval to
//! elapse, which catches growth from other handles) and keeps reading.
//!
//! ```text
//! file ──read_buf──▶ BytesMut ──DelimiterChunker──▶ decode ──mpsc──▶ ScanStream
//!                        ▲                                              │
//!                   tail watch / poll                          close() cancels
//! ```

use std::io::SeekFrom;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use fslog_core::{Chunk, Codec, DelimiterChunker, KeyError, Offset, OffsetKey};
use futures::Stream;
use futures::stream::FusedStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::error::LogError;
use crate::log::FsLog;

/// Range options of a scan
///
/// When both are given, `gt` wins over `gte`/`offset` and `lt` wins over `lte`.
/// `offset` is an alias for `gte` and takes precedence over it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Start after the record at this key
    pub gt: Option<OffsetKey>,
    /// Start at the record at this key
    pub gte: Option<OffsetKey>,
    /// Alias for `gte`
    pub offset: Option<OffsetKey>,
    /// Stop before the record at this key
    pub lt: Option<OffsetKey>,
    /// Stop after the record at this key
    pub lte: Option<OffsetKey>,
    /// Keep following the file after reaching its current end
    pub tail: bool,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gt(mut self, key: impl Into<OffsetKey>) -> Self {
        self.gt = Some(key.into());
        self
    }

    pub fn gte(mut self, key: impl Into<OffsetKey>) -> Self {
        self.gte = Some(key.into());
        self
    }

    pub fn offset(mut self, key: impl Into<OffsetKey>) -> Self {
        self.offset = Some(key.into());
        self
    }

    pub fn lt(mut self, key: impl Into<OffsetKey>) -> Self {
        self.lt = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<OffsetKey>) -> Self {
        self.lte = Some(key.into());
        self
    }

    pub fn tail(mut self, follow: bool) -> Self {
        self.tail = follow;
        self
    }
}

/// Half-open byte window `[start, end)` of a scan; `end = None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: u64,
    pub end: Option<u64>,
}

impl ScanWindow {
    /// Translate range options into a byte window
    pub fn resolve(options: &ScanOptions, delimiter_len: usize) -> Result<Self, KeyError> {
        let lower = options
            .gt
            .as_ref()
            .map(|key| key.normalize().map(|o| o.next_start(delimiter_len)))
            .or_else(|| {
                options
                    .offset
                    .as_ref()
                    .or(options.gte.as_ref())
                    .map(|key| key.normalize().map(|o| o.start))
            })
            .transpose()?;

        let upper = options
            .lt
            .as_ref()
            .map(|key| key.normalize().map(|o| o.start))
            .or_else(|| {
                options
                    .lte
                    .as_ref()
                    .map(|key| key.normalize().map(|o| o.end()))
            })
            .transpose()?;

        Ok(Self {
            start: lower.unwrap_or(0),
            end: upper,
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end <= self.start)
    }

    /// Bytes left in the window from `position`, `None` if unbounded
    fn remaining(&self, position: u64) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(position))
    }
}

/// One record yielded by a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry<T> {
    pub offset: Offset,
    pub value: T,
}

/// Handle that stops a scan from anywhere
///
/// Closing is idempotent. The reader task releases its file descriptor and
/// stops following the file; the stream then ends without further records.
#[derive(Debug, Clone)]
pub struct ScanCloser {
    cancel: CancellationToken,
    released: CancellationToken,
}

impl ScanCloser {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            released: CancellationToken::new(),
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the reader task has finished and dropped the file
    pub async fn closed(&self) {
        self.released.cancelled().await
    }
}

/// Lazy sequence of records produced by [`FsLog::scan`]
///
/// Ends with `None` exactly once: at the end of the window, after an error,
/// or after [`close`](Self::close).
#[derive(Debug)]
pub struct ScanStream<T> {
    rx: mpsc::Receiver<Result<LogEntry<T>, LogError>>,
    closer: ScanCloser,
    done: bool,
}

impl<T> ScanStream<T> {
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn closer(&self) -> ScanCloser {
        self.closer.clone()
    }

    /// Resolves once the reader task has released the file
    pub async fn closed(&self) {
        self.closer.closed().await
    }
}

impl<T> Stream for ScanStream<T> {
    type Item = Result<LogEntry<T>, LogError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.closer.is_closed() {
            this.done = true;
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl<T> FusedStream for ScanStream<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Drop for ScanStream<T> {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl<C: Codec> FsLog<C> {
    /// Stream records in the window described by `options`
    ///
    /// Keys are validated before the file is opened. Each call opens an
    /// independent read descriptor; the stream is not restartable.
    #[instrument(skip_all, fields(tail = options.tail))]
    pub async fn scan<T>(&self, options: ScanOptions) -> Result<ScanStream<T>, LogError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let window = ScanWindow::resolve(&options, self.delimiter().len())?;
        self.ensure_open()?;

        let mut file = File::open(self.path()).await?;
        file.seek(SeekFrom::Start(window.start)).await?;

        let config = self.config();
        let (tx, rx) = mpsc::channel(config.scan_channel_capacity);
        let closer = ScanCloser::new();

        debug!(start = window.start, end = ?window.end, "Starting scan");

        let reader = ScanReader {
            file,
            window,
            follow: options.tail,
            position: window.start,
            chunker: DelimiterChunker::new(config.delimiter.clone(), window.start),
            buf: BytesMut::new(),
            read_size: config.read_buffer_size,
            codec: Arc::clone(&self.codec),
            tail_rx: Some(self.subscribe_tail()),
            poll_interval: config.tail_poll_interval(),
            cancel: closer.cancel.clone(),
            emitted: 0,
            _marker: PhantomData,
        };
        let released = closer.released.clone().drop_guard();
        tokio::spawn(async move {
            let _released = released;
            reader.run(tx).await;
        });

        Ok(ScanStream {
            rx,
            closer,
            done: false,
        })
    }
}

/// Reader side of one scan, owned by its task
struct ScanReader<C, T> {
    file: File,
    window: ScanWindow,
    follow: bool,
    /// Next file position to read
    position: u64,
    chunker: DelimiterChunker,
    buf: BytesMut,
    read_size: usize,
    codec: Arc<C>,
    tail_rx: Option<watch::Receiver<u64>>,
    poll_interval: Duration,
    cancel: CancellationToken,
    emitted: u64,
    _marker: PhantomData<fn() -> T>,
}

type EntrySender<T> = mpsc::Sender<Result<LogEntry<T>, LogError>>;

impl<C: Codec, T: DeserializeOwned + Send + 'static> ScanReader<C, T> {
    async fn run(mut self, tx: EntrySender<T>) {
        match self.pump(&tx).await {
            Ok(()) => debug!(records = self.emitted, "Scan finished"),
            Err(e) => {
                debug!(records = self.emitted, error = %e, "Scan failed");
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tx.send(Err(e)) => {}
                }
            }
        }
    }

    /// Read, frame and emit until the window ends, the scan is closed or the
    /// consumer goes away
    async fn pump(&mut self, tx: &EntrySender<T>) -> Result<(), LogError> {
        loop {
            while let Some(chunk) = self.chunker.decode(&mut self.buf)? {
                if !self.emit(chunk, tx).await? {
                    return Ok(());
                }
            }

            let want = match self.window.remaining(self.position) {
                Some(0) => {
                    // The window ends inside the last record (lte): flush it
                    while let Some(chunk) = self.chunker.decode_eof(&mut self.buf)? {
                        if !self.emit(chunk, tx).await? {
                            return Ok(());
                        }
                    }
                    return Ok(());
                }
                Some(left) => left.min(self.read_size as u64),
                None => self.read_size as u64,
            };

            self.buf.reserve(want as usize);
            let mut limited = (&mut self.file).take(want);
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                read = limited.read_buf(&mut self.buf) => read?,
            };

            if read > 0 {
                self.position += read as u64;
                continue;
            }

            if !self.follow {
                if !self.buf.is_empty() {
                    warn!(
                        position = self.chunker.position(),
                        bytes = self.buf.len(),
                        "Ignoring unterminated record at end of file"
                    );
                }
                return Ok(());
            }

            if !self.wait_for_growth().await {
                return Ok(());
            }
        }
    }

    /// Decode one chunk and hand it to the consumer; false once nobody listens
    async fn emit(&mut self, chunk: Chunk, tx: &EntrySender<T>) -> Result<bool, LogError> {
        let value: T = self
            .codec
            .decode(&chunk.payload)
            .map_err(|e| LogError::decode(format!("record at {}: {}", chunk.offset, e)))?;

        trace!(offset = %chunk.offset, "Scanned record");

        let entry = LogEntry {
            offset: chunk.offset,
            value,
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(false),
            sent = tx.send(Ok(entry)) => {
                self.emitted += 1;
                Ok(sent.is_ok())
            }
        }
    }

    /// Wait for the file to grow; false if the scan was closed meanwhile
    async fn wait_for_growth(&mut self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = next_tail_change(&mut self.tail_rx) => true,
            _ = tokio::time::sleep(self.poll_interval) => true,
        }
    }
}

/// Resolves on the next append through the owning handle
///
/// Once the handle is dropped this never resolves and the poll interval
/// alone drives the scan.
async fn next_tail_change(rx: &mut Option<watch::Receiver<u64>>) {
    if let Some(inner) = rx {
        if inner.changed().await.is_ok() {
            return;
        }
        *rx = None;
    }
    std::future::pending::<()>().await
}
