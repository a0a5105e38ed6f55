//! Bulk ingestion
//!
//! Two ways to feed many values into a log, both appending one value at a
//! time through [`FsLog::append`] and reporting each item's outcome:
//!
//! - [`FsLog::append_all`] maps a stream of values to a stream of results;
//!   the next value is only pulled once the previous append resolved.
//! - [`LogWriter`] is a single-consumer write queue running in its own task,
//!   for producers that live in other tasks. The queue is bounded, so a
//!   producer waits instead of running ahead of unacknowledged writes.

use std::sync::Arc;

use fslog_core::{Codec, Offset};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::LogError;
use crate::log::FsLog;

impl<C: Codec> FsLog<C> {
    /// Append every value of `values` in order
    ///
    /// Yields one result per value. A failed append does not stop the
    /// stream; the producer decides whether to continue.
    pub fn append_all<'a, T, S>(
        &'a self,
        values: S,
    ) -> impl Stream<Item = Result<Offset, LogError>> + 'a
    where
        T: Serialize + 'a,
        S: Stream<Item = T> + 'a,
    {
        values.then(move |value| async move { self.append(&value).await })
    }
}

type WriteRequest<T> = (T, oneshot::Sender<Result<Offset, LogError>>);

/// Acknowledgement of one queued write
#[derive(Debug)]
pub struct WriteAck {
    rx: oneshot::Receiver<Result<Offset, LogError>>,
}

impl WriteAck {
    /// Wait for the append to complete
    pub async fn offset(self) -> Result<Offset, LogError> {
        self.rx.await.map_err(|_| LogError::Closed)?
    }
}

/// Write queue feeding a shared log from any task
#[derive(Debug)]
pub struct LogWriter<T> {
    tx: mpsc::Sender<WriteRequest<T>>,
    task: JoinHandle<u64>,
}

impl<T> LogWriter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Start the queue task; at most `capacity` writes wait in the queue
    pub fn spawn<C: Codec>(log: Arc<FsLog<C>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteRequest<T>>(capacity.max(1));

        let task = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some((value, ack)) = rx.recv().await {
                let result = log.append(&value).await;
                match &result {
                    Ok(_) => written += 1,
                    Err(e) => warn!(error = %e, "Queued append failed"),
                }
                // The producer may have stopped waiting
                let _ = ack.send(result);
            }
            debug!(written = written, "Write queue drained");
            written
        });

        Self { tx, task }
    }

    /// Queue a value, waiting while the queue is full
    pub async fn enqueue(&self, value: T) -> Result<WriteAck, LogError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((value, ack_tx))
            .await
            .map_err(|_| LogError::Closed)?;
        Ok(WriteAck { rx: ack_rx })
    }

    /// Queue a value and wait for its offset
    pub async fn write(&self, value: T) -> Result<Offset, LogError> {
        self.enqueue(value).await?.offset().await
    }

    /// Stop accepting writes, finish the queued ones and return how many succeeded
    pub async fn shutdown(self) -> Result<u64, LogError> {
        drop(self.tx);
        self.task
            .await
            .map_err(|e| LogError::write(format!("write queue task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogConfig;
    use futures::stream;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    async fn create_test_log() -> (Arc<FsLog>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let log = FsLog::open(temp_dir.path().join("writer.log"), LogConfig::testing())
            .await
            .unwrap();
        (Arc::new(log), temp_dir)
    }

    #[tokio::test]
    async fn test_append_all_reports_each_item() {
        let (log, _temp) = create_test_log().await;

        let values = stream::iter(vec![json!(1), json!("two"), json!({"three": 3})]);
        let results: Vec<_> = log.append_all(values).collect().await;

        assert_eq!(results.len(), 3);
        let offsets: Vec<Offset> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(offsets[0], Offset::new(0, 1));
        assert_eq!(offsets[1], Offset::new(3, 5));
        assert_eq!(offsets[2].start, 10);

        let value: Value = log.get(offsets[1]).await.unwrap();
        assert_eq!(value, json!("two"));
    }

    #[tokio::test]
    async fn test_append_all_surfaces_failures_per_item() {
        let (log, _temp) = create_test_log().await;
        log.close().await.unwrap();

        let results: Vec<_> = log
            .append_all(stream::iter(vec![json!(1), json!(2)]))
            .collect()
            .await;
        assert!(results.iter().all(|r| matches!(r, Err(LogError::Closed))));
    }

    #[tokio::test]
    async fn test_writer_from_many_tasks() {
        let (log, _temp) = create_test_log().await;
        let writer = Arc::new(LogWriter::<Value>::spawn(Arc::clone(&log), 2));

        let mut handles = Vec::new();
        for task in 0..4 {
            let writer = Arc::clone(&writer);
            handles.push(tokio::spawn(async move {
                let mut offsets = Vec::new();
                for i in 0..25 {
                    let offset = writer.write(json!({"task": task, "i": i})).await.unwrap();
                    offsets.push(offset);
                }
                offsets
            }));
        }

        let mut offsets = Vec::new();
        for handle in handles {
            offsets.extend(handle.await.unwrap());
        }
        offsets.sort();

        assert_eq!(offsets.len(), 100);
        for pair in offsets.windows(2) {
            assert_eq!(pair[0].next_start(2), pair[1].start);
        }
        assert_eq!(offsets.last().unwrap().next_start(2), log.tail());

        let writer = Arc::into_inner(writer).unwrap();
        assert_eq!(writer.shutdown().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_enqueue_then_await_acks() {
        let (log, _temp) = create_test_log().await;
        let writer = LogWriter::spawn(Arc::clone(&log), 8);

        let mut acks = Vec::new();
        for i in 0..5 {
            acks.push(writer.enqueue(json!(i)).await.unwrap());
        }

        let mut previous: Option<Offset> = None;
        for ack in acks {
            let offset = ack.offset().await.unwrap();
            if let Some(prev) = previous {
                assert_eq!(prev.next_start(2), offset.start);
            }
            previous = Some(offset);
        }

        assert_eq!(writer.shutdown().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_writer_reports_closed_log() {
        let (log, _temp) = create_test_log().await;
        let writer = LogWriter::spawn(Arc::clone(&log), 1);

        log.close().await.unwrap();
        let err = writer.write(json!("late")).await.unwrap_err();
        assert!(matches!(err, LogError::Closed));
        assert_eq!(writer.shutdown().await.unwrap(), 0);
    }
}
