// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log workers accumulate events into a private fixed-capacity buffer and hand
//! the buffer contents to the file writer when the next event would not fit.
//!
//! An event is never split across two entries: the flush happens before the
//! overflowing event is copied. Events are appended in the order the worker
//! receives them. Entries from different workers interleave in the hand-off
//! queue in arrival order, so there is no global ordering across workers.

use crate::queue::{Event, HandoffSender, LogEntry};
use crate::stats::{SizeRange, Stats};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub struct LogWorker {
    id: usize,
    buffer: Box<[u8]>,
    position: usize,
    requests_handled: u64,
    sizes: SizeRange,
    handoff: HandoffSender,
    stats: Arc<Stats>,
}

impl LogWorker {
    /// Creates a worker whose buffer holds `capacity` bytes for its whole life
    pub fn new(id: usize, capacity: usize, handoff: HandoffSender, stats: Arc<Stats>) -> Self {
        Self {
            id,
            buffer: vec![0; capacity].into_boxed_slice(),
            position: 0,
            requests_handled: 0,
            sizes: SizeRange::default(),
            handoff,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Valid bytes currently held in the buffer
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn buffered(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    pub fn requests_handled(&self) -> u64 {
        self.requests_handled
    }

    pub fn sizes(&self) -> SizeRange {
        self.sizes
    }

    /// Receives events from the shared ingest queue until every producer is
    /// gone, then flushes whatever is left in the buffer.
    pub async fn run(mut self, events: flume::Receiver<Event>) {
        debug!("Log worker {} started", self.id);

        while let Ok(event) = events.recv_async().await {
            self.ingest(&event).await;
        }

        self.flush().await;
        debug!(
            "Log worker {} stopped after {} requests",
            self.id, self.requests_handled
        );
    }

    /// Appends one event to the buffer, flushing first if it would overflow.
    ///
    /// Events larger than the buffer are dropped with a warning and leave the
    /// worker untouched.
    pub async fn ingest(&mut self, event: &[u8]) {
        let length = event.len();
        trace!("Worker {}: request length {}", self.id, length);

        if length > self.capacity() {
            warn!(
                "Worker {}: message of {} bytes exceeds buffer capacity of {} bytes, dropping it",
                self.id,
                length,
                self.capacity()
            );
            self.stats.record_oversized_drop();
            return;
        }

        self.sizes.observe(length);

        trace!(
            "Worker {}: msg length {}, position {}, capacity {}",
            self.id,
            length,
            self.position,
            self.capacity()
        );

        if length + self.position > self.capacity() {
            debug!("Worker {}: dumping buffer to file", self.id);
            self.flush().await;
        }

        self.buffer[self.position..self.position + length].copy_from_slice(event);
        self.position += length;
        self.requests_handled += 1;
        self.stats.record_request(&self.sizes);
    }

    /// Hands the valid part of the buffer to the writer and empties it.
    /// Does nothing on an empty buffer.
    pub async fn flush(&mut self) {
        if self.position == 0 {
            return;
        }

        let entry = LogEntry::from(self.buffered());
        self.position = 0;

        if let Err(entry) = self.handoff.send(entry).await {
            error!(
                "Worker {}: file writer is gone, {} bytes lost",
                self.id,
                entry.len()
            );
        }
    }
}
