//! Run coordinator - orchestrates a pre-compression run
//!
//! The coordinator is responsible for:
//! - Compiling the ignore pattern and sizing the work queue
//! - Starting the worker pool
//! - Walking the tree on the calling thread
//! - Closing the queue and joining workers
//! - Merging counts and picking the error to report

use crate::config::RunConfig;
use crate::error::{ConfigError, PrecompressError, WorkerError};
use crate::ignore::IgnorePattern;
use crate::walker::queue::{QueueStats, WorkQueue};
use crate::walker::tree::{SkipPolicy, TreeWalker, WalkStats};
use crate::walker::worker::{
    aggregate_stats, PoolStats, RunOutcome, Worker, WorkerContext, WorkerStats,
};
use filetime::FileTime;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// How often progress callbacks fire
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a completed run
///
/// The count is accurate even when the run failed; `error` holds at most
/// one representative failure.
#[derive(Debug)]
pub struct RunReport {
    /// Artifacts created or refreshed
    pub compressed: u64,

    /// Walker counters
    pub walk: WalkStats,

    /// Worker totals
    pub pool: PoolStats,

    /// Time taken for the run
    pub duration: Duration,

    /// First error; a traversal error takes precedence over worker errors
    pub error: Option<PrecompressError>,
}

impl RunReport {
    fn failed_before_start(error: PrecompressError) -> Self {
        Self {
            compressed: 0,
            walk: WalkStats::default(),
            pool: PoolStats::default(),
            duration: Duration::ZERO,
            error: Some(error),
        }
    }

    /// Returns true if the run completed without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into the count, or the error if there was one
    pub fn into_result(self) -> crate::Result<u64> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.compressed),
        }
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    /// Files queued by the walker
    pub queued: u64,

    /// Files waiting in the queue
    pub pending: u64,

    /// Files picked up by workers
    pub processed: u64,

    /// Artifacts written
    pub compressed: u64,

    /// Source bytes read
    pub bytes_in: u64,

    /// Artifact bytes written
    pub bytes_out: u64,

    /// Errors encountered
    pub errors: u64,

    /// Total workers
    pub workers: usize,

    /// Elapsed time
    pub elapsed: Duration,
}

impl RunProgress {
    fn snapshot(
        queue: &QueueStats,
        workers: &[Arc<WorkerStats>],
        elapsed: Duration,
    ) -> Self {
        let mut progress = RunProgress {
            queued: queue.enqueued.load(Ordering::Relaxed),
            pending: queue.pending(),
            workers: workers.len(),
            elapsed,
            ..Default::default()
        };
        for w in workers {
            progress.processed += w.received.load(Ordering::Relaxed);
            progress.compressed += w.compressed.load(Ordering::Relaxed);
            progress.bytes_in += w.bytes_in.load(Ordering::Relaxed)
                + w.bytes_rejected.load(Ordering::Relaxed);
            progress.bytes_out += w.bytes_out.load(Ordering::Relaxed);
            progress.errors += w.errors.load(Ordering::Relaxed);
        }
        progress
    }

    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Compresses every eligible file under a root directory
#[derive(Debug, Clone)]
pub struct Precompressor {
    root: PathBuf,
    mtime: FileTime,
    concurrency: usize,
    ignore: IgnorePattern,
    policy: SkipPolicy,
}

impl Precompressor {
    /// Create a precompressor, compiling the ignore fragments
    ///
    /// Any positive worker count is accepted.
    pub fn new<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        mtime: SystemTime,
        concurrency: usize,
        ignore_fragments: &[S],
    ) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::NoWorkers);
        }

        Ok(Self {
            root: root.into(),
            mtime: FileTime::from_system_time(mtime),
            concurrency,
            ignore: IgnorePattern::new(ignore_fragments)?,
            policy: SkipPolicy::default(),
        })
    }

    /// Create from a validated configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            root: config.root.clone(),
            mtime: FileTime::from_system_time(config.mtime),
            concurrency: config.concurrency,
            ignore: config.ignore.clone(),
            policy: config.skip_policy,
        }
    }

    /// Set the skip policy for files with an existing artifact
    pub fn skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run to completion
    pub fn run(&self) -> RunReport {
        self.execute(None)
    }

    /// Run to completion, calling `callback` periodically with progress
    pub fn run_with_progress<F>(&self, callback: F) -> RunReport
    where
        F: Fn(RunProgress) + Sync,
    {
        self.execute(Some(&callback))
    }

    fn execute(&self, progress: Option<&(dyn Fn(RunProgress) + Sync)>) -> RunReport {
        let start = Instant::now();

        info!(
            root = %self.root.display(),
            workers = self.concurrency,
            ignore = self.ignore.as_str().unwrap_or(""),
            "Starting pre-compression"
        );

        let queue = WorkQueue::for_workers(self.concurrency);
        debug!(capacity = queue.capacity(), "Work queue ready");
        let queue_stats = queue.stats();
        let (queue_tx, queue_rx) = queue.split();

        let ctx = Arc::new(WorkerContext {
            root: self.root.clone(),
            mtime: self.mtime,
            ignore: self.ignore.clone(),
        });
        let outcome = Arc::new(RunOutcome::new());

        let mut workers = Vec::with_capacity(self.concurrency);
        let mut spawn_error = None;
        for id in 0..self.concurrency {
            match Worker::spawn(id, Arc::clone(&ctx), queue_rx.clone(), Arc::clone(&outcome)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        // Workers hold the only receivers now
        drop(queue_rx);

        let live: Vec<Arc<WorkerStats>> = workers.iter().map(Worker::stats_handle).collect();
        let stop = AtomicBool::new(false);
        let mut walker = TreeWalker::new(&self.root, &self.ignore, self.mtime).policy(self.policy);

        let walk_result = thread::scope(|scope| {
            if let Some(callback) = progress {
                let (stop, live, queue_stats) = (&stop, &live, &queue_stats);
                scope.spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        callback(RunProgress::snapshot(queue_stats, live, start.elapsed()));
                        thread::sleep(PROGRESS_INTERVAL);
                    }
                });
            }

            let result = match spawn_error {
                Some(e) => Err(PrecompressError::from(e)),
                None => walker.walk(&queue_tx),
            };

            // Closing lets workers finish once the queue drains
            queue_tx.close();

            for worker in &mut workers {
                if let Err(e) = worker.join() {
                    warn!(worker = worker.id(), error = %e, "Worker failed to join cleanly");
                    outcome.record_error(e.into());
                }
            }

            stop.store(true, Ordering::Relaxed);
            result
        });

        let worker_error = outcome.take_error();
        let error = match walk_result {
            // All workers gone: their own error explains why
            Err(PrecompressError::Worker(WorkerError::QueueClosed)) if worker_error.is_some() => {
                worker_error
            }
            Err(e) => Some(e),
            Ok(()) => worker_error,
        };

        let report = RunReport {
            compressed: outcome.compressed(),
            walk: walker.stats().clone(),
            pool: aggregate_stats(&workers),
            duration: start.elapsed(),
            error,
        };

        match &report.error {
            None => info!(
                compressed = report.compressed,
                queued = report.walk.queued,
                duration_ms = report.duration.as_millis() as u64,
                "Pre-compression completed"
            ),
            Some(e) => warn!(
                compressed = report.compressed,
                error = %e,
                "Pre-compression failed"
            ),
        }

        report
    }
}

/// Compress every eligible file under `root`
///
/// Convenience wrapper around [`Precompressor`]. Configuration errors are
/// reported in the returned report before any file is touched.
pub fn recursive<S: AsRef<str>>(
    root: impl Into<PathBuf>,
    mtime: SystemTime,
    concurrency: usize,
    ignore_fragments: &[S],
) -> RunReport {
    match Precompressor::new(root, mtime, concurrency, ignore_fragments) {
        Ok(p) => p.run(),
        Err(e) => RunReport::failed_before_start(e.into()),
    }
}
