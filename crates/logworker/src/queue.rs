// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The two bounded queues of the pipeline.
//!
//! - The ingest queue carries raw events from producers to the log workers.
//!   All workers receive from the same queue and compete for events. A full
//!   queue makes the producer wait up to the submit timeout, after which the
//!   event is dropped.
//! - The hand-off queue carries flushed [`LogEntry`] values from the workers to
//!   the single file writer. Sending never times out: entries are data that has
//!   already left a worker buffer.

use crate::stats::Stats;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// One raw event submitted by a producer
pub type Event = Vec<u8>;

/// Immutable snapshot of a worker buffer at flush time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry(Box<[u8]>);

impl LogEntry {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for LogEntry {
    fn from(bytes: &[u8]) -> Self {
        LogEntry(bytes.into())
    }
}

impl Deref for LogEntry {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for LogEntry {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Outcome of a producer submission. Producers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// Queue stayed full for the whole submit timeout
    DroppedTimeout,
    /// Every worker is gone
    DroppedClosed,
}

/// Producer side of the ingest queue (cheap to clone)
#[derive(Clone)]
pub struct IngestHandle {
    tx: flume::Sender<Event>,
    timeout: Duration,
    stats: Arc<Stats>,
}

impl IngestHandle {
    /// Enqueues an event, waiting at most the submit timeout for room.
    pub async fn submit(&self, event: Event) -> Submitted {
        match tokio::time::timeout(self.timeout, self.tx.send_async(event)).await {
            Ok(Ok(())) => Submitted::Queued,
            Ok(Err(_)) => {
                debug!("Ingest queue closed, dropping event");
                Submitted::DroppedClosed
            }
            Err(_) => {
                trace!(
                    "Ingest queue full for {:?}, dropping event",
                    self.timeout
                );
                self.stats.record_overload_drop();
                Submitted::DroppedTimeout
            }
        }
    }
}

/// Creates the ingest queue. The receiver is cloned once per worker.
pub fn ingest_queue(
    capacity: usize,
    timeout: Duration,
    stats: Arc<Stats>,
) -> (IngestHandle, flume::Receiver<Event>) {
    let (tx, rx) = flume::bounded(capacity);
    (IngestHandle { tx, timeout, stats }, rx)
}

/// Worker side of the hand-off queue
#[derive(Clone)]
pub struct HandoffSender {
    tx: flume::Sender<LogEntry>,
}

impl HandoffSender {
    /// Enqueues an entry for the writer, waiting as long as the queue is full.
    ///
    /// Returns the entry back if the writer is gone.
    pub async fn send(&self, entry: LogEntry) -> Result<(), LogEntry> {
        self.tx.send_async(entry).await.map_err(|e| e.into_inner())
    }
}

/// Creates the hand-off queue between the workers and the file writer
pub fn handoff_queue(capacity: usize) -> (HandoffSender, flume::Receiver<LogEntry>) {
    let (tx, rx) = flume::bounded(capacity);
    (HandoffSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_ingest_queue_drops_after_timeout() {
        let stats = Arc::new(Stats::new(1));
        let (handle, rx) = ingest_queue(2, Duration::from_secs(5), Arc::clone(&stats));

        assert_eq!(handle.submit(b"first".to_vec()).await, Submitted::Queued);
        assert_eq!(handle.submit(b"second".to_vec()).await, Submitted::Queued);

        let started = tokio::time::Instant::now();
        assert_eq!(
            handle.submit(b"third".to_vec()).await,
            Submitted::DroppedTimeout
        );
        assert!(started.elapsed() >= Duration::from_secs(5));

        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv().unwrap(), b"first".to_vec());
        assert_eq!(rx.try_recv().unwrap(), b"second".to_vec());
        assert!(rx.try_recv().is_err());
        assert_eq!(stats.snapshot().events_dropped_overload, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_submit_succeeds_when_room_frees_up() {
        let stats = Arc::new(Stats::new(1));
        let (handle, rx) = ingest_queue(1, Duration::from_secs(5), Arc::clone(&stats));

        assert_eq!(handle.submit(b"a".to_vec()).await, Submitted::Queued);

        let consumer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let first = rx.recv_async().await.unwrap();
            let second = rx.recv_async().await.unwrap();
            (first, second)
        });

        assert_eq!(handle.submit(b"b".to_vec()).await, Submitted::Queued);
        let (first, second) = consumer.await.unwrap();
        assert_eq!(first, b"a".to_vec());
        assert_eq!(second, b"b".to_vec());
        assert_eq!(stats.snapshot().events_dropped_overload, 0);
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue() {
        let stats = Arc::new(Stats::new(1));
        let (handle, rx) = ingest_queue(4, Duration::from_secs(5), stats);
        drop(rx);

        assert_eq!(
            handle.submit(b"late".to_vec()).await,
            Submitted::DroppedClosed
        );
    }

    #[tokio::test]
    async fn test_competing_consumers_each_get_distinct_events() {
        let stats = Arc::new(Stats::new(2));
        let (handle, rx) = ingest_queue(16, Duration::from_secs(5), stats);
        let rx2 = rx.clone();

        for i in 0..10u8 {
            handle.submit(vec![i]).await;
        }
        drop(handle);

        let mut seen: Vec<u8> = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.extend(event);
            if let Ok(event) = rx2.try_recv() {
                seen.extend(event);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_handoff_returns_entry_when_writer_gone() {
        let (tx, rx) = handoff_queue(1);
        drop(rx);

        let entry = LogEntry::from(&b"orphan"[..]);
        let returned = tx.send(entry.clone()).await.unwrap_err();
        assert_eq!(returned, entry);
    }
}
