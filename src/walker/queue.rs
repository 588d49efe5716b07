//! Bounded work queue between the tree walker and the workers
//!
//! One producer (the walker) pushes relative file paths, any number of
//! workers pull them. The queue is closed by dropping the sender; workers
//! keep receiving until it is both closed and empty.

use crate::error::WorkerError;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Queue slots per worker
pub const SLOTS_PER_WORKER: usize = 10;

/// A file to consider for compression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Path relative to the tree root
    pub relative: PathBuf,
}

impl WorkItem {
    pub fn new(relative: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.relative
    }
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total items enqueued
    pub enqueued: AtomicU64,

    /// Total items dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    /// Items enqueued but not yet picked up
    pub fn pending(&self) -> u64 {
        self.enqueued
            .load(Ordering::Relaxed)
            .saturating_sub(self.dequeued.load(Ordering::Relaxed))
    }
}

/// Bounded work queue
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    capacity: usize,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    /// Create a new work queue with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);

        Self {
            sender,
            receiver,
            capacity,
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Create a queue sized for `workers` consumers
    pub fn for_workers(workers: usize) -> Self {
        Self::new(workers.max(1) * SLOTS_PER_WORKER)
    }

    /// Get queue capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Split into the single producer handle and a cloneable consumer handle
    ///
    /// Dropping the returned sender closes the queue.
    pub fn split(self) -> (WorkQueueSender, WorkQueueReceiver) {
        (
            WorkQueueSender {
                sender: self.sender,
                stats: Arc::clone(&self.stats),
            },
            WorkQueueReceiver {
                receiver: self.receiver,
                stats: self.stats,
            },
        )
    }
}

/// Handle for sending items to the queue
pub struct WorkQueueSender {
    sender: Sender<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Send an item, blocking while the queue is full
    ///
    /// Fails only if every receiver has been dropped.
    pub fn send(&self, item: WorkItem) -> Result<(), WorkerError> {
        self.sender
            .send(item)
            .map_err(|_| WorkerError::QueueClosed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Close the queue
    pub fn close(self) {
        drop(self);
    }
}

/// Handle for receiving items from the queue
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Receive an item from the queue
    ///
    /// Blocks until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn recv(&self) -> Option<WorkItem> {
        match self.receiver.recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }

    /// Try to receive an item without blocking
    pub fn try_recv(&self) -> Option<WorkItem> {
        match self.receiver.try_recv() {
            Ok(item) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            Err(_) => None,
        }
    }
}
