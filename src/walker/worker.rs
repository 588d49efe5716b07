//! Worker thread logic for parallel compression
//!
//! Each worker:
//! - Owns its own output and copy buffers
//! - Pulls relative file paths from the work queue
//! - Runs the conditional compressor on each one
//! - Publishes its successes into the shared [`RunOutcome`]
//!
//! After its first failure a worker stops compressing but keeps draining the
//! queue, so the walker never blocks on a full queue and shutdown stays clean.

use crate::compress::{try_compress, CompressBuffers, CompressOutcome};
use crate::error::{PrecompressError, WorkerError};
use crate::ignore::IgnorePattern;
use crate::walker::queue::WorkQueueReceiver;
use filetime::FileTime;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Settings shared read-only by all workers
#[derive(Debug)]
pub struct WorkerContext {
    /// Tree root that work items are relative to
    pub root: PathBuf,

    /// Target modification time
    pub mtime: FileTime,

    /// Ignore pattern, re-checked per item
    pub ignore: IgnorePattern,
}

/// Merge point for all workers: total count and first error
///
/// The count is an atomic sum and the error slot is only written while
/// empty, so concurrent publication neither loses updates nor overwrites the
/// first error.
#[derive(Debug, Default)]
pub struct RunOutcome {
    compressed: AtomicU64,
    first_error: Mutex<Option<PrecompressError>>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the number of artifacts written
    pub fn add_compressed(&self, n: u64) {
        self.compressed.fetch_add(n, Ordering::Relaxed);
    }

    /// Number of artifacts written so far
    pub fn compressed(&self) -> u64 {
        self.compressed.load(Ordering::Relaxed)
    }

    /// Record an error; returns false if an earlier one was already recorded
    pub fn record_error(&self, err: PrecompressError) -> bool {
        let mut slot = self.first_error.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(err);
        true
    }

    /// Take the first recorded error
    pub fn take_error(&self) -> Option<PrecompressError> {
        self.first_error.lock().take()
    }
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Items taken off the queue
    pub received: AtomicU64,

    /// Artifacts written
    pub compressed: AtomicU64,

    /// Files rejected because compression would not shrink them
    pub not_smaller: AtomicU64,

    /// Items dropped by the ignore pattern or after an earlier failure
    pub skipped: AtomicU64,

    /// Files that failed
    pub errors: AtomicU64,

    /// Source bytes of files that got an artifact
    pub bytes_in: AtomicU64,

    /// Artifact bytes written
    pub bytes_out: AtomicU64,

    /// Source bytes of files rejected as not smaller
    pub bytes_rejected: AtomicU64,
}

impl WorkerStats {
    fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &CompressOutcome) {
        match *outcome {
            CompressOutcome::Compressed {
                original,
                compressed,
            } => {
                self.compressed.fetch_add(1, Ordering::Relaxed);
                self.bytes_in.fetch_add(original, Ordering::Relaxed);
                self.bytes_out.fetch_add(compressed, Ordering::Relaxed);
            }
            CompressOutcome::NotSmaller { original } => {
                self.not_smaller.fetch_add(1, Ordering::Relaxed);
                self.bytes_rejected.fetch_add(original, Ordering::Relaxed);
            }
        }
    }

    fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Totals over all workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub received: u64,
    pub compressed: u64,
    pub not_smaller: u64,
    pub skipped: u64,
    pub errors: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub bytes_rejected: u64,
}

/// A worker thread that compresses queued files
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        ctx: Arc<WorkerContext>,
        queue_rx: WorkQueueReceiver,
        outcome: Arc<RunOutcome>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("compress-{}", id))
            .spawn(move || worker_loop(id, &ctx, &queue_rx, &outcome, &stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Shared handle to the statistics, for live progress
    pub fn stats_handle(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Wait for the worker to finish
    ///
    /// Statistics stay readable afterwards.
    pub fn join(&mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|panic| WorkerError::Panicked {
                id: self.id,
                message: panic_message(panic.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Worker thread panicked".into()
    }
}

/// Main worker loop
///
/// Runs until the queue is closed and drained.
fn worker_loop(
    id: usize,
    ctx: &WorkerContext,
    queue_rx: &WorkQueueReceiver,
    outcome: &RunOutcome,
    stats: &WorkerStats,
) {
    trace!(worker = id, "Worker starting");

    let mut bufs = CompressBuffers::new();
    let mut failed = false;
    let mut compressed = 0u64;

    while let Some(item) = queue_rx.recv() {
        stats.record_received();

        if failed || ctx.ignore.is_match(item.path()) {
            stats.record_skip();
            continue;
        }

        let path = ctx.root.join(item.path());
        match try_compress(&path, ctx.mtime, &mut bufs) {
            Ok(result) => {
                stats.record_outcome(&result);
                if result.is_changed() {
                    compressed += 1;
                }
            }
            Err(e) => {
                stats.record_error();
                warn!(worker = id, error = %e, "Compression failed, draining queue");
                outcome.record_error(e);
                failed = true;
            }
        }
    }

    outcome.add_compressed(compressed);

    debug!(
        worker = id,
        compressed,
        received = stats.received.load(Ordering::Relaxed),
        "Worker finished"
    );
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> PoolStats {
    let mut total = PoolStats::default();

    for worker in workers {
        let s = worker.stats();
        total.received += s.received.load(Ordering::Relaxed);
        total.compressed += s.compressed.load(Ordering::Relaxed);
        total.not_smaller += s.not_smaller.load(Ordering::Relaxed);
        total.skipped += s.skipped.load(Ordering::Relaxed);
        total.errors += s.errors.load(Ordering::Relaxed);
        total.bytes_in += s.bytes_in.load(Ordering::Relaxed);
        total.bytes_out += s.bytes_out.load(Ordering::Relaxed);
        total.bytes_rejected += s.bytes_rejected.load(Ordering::Relaxed);
    }

    total
}
