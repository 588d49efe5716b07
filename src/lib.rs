//! pre-compress - Build-time gzip artifact generator
//!
//! Walks a directory tree and writes a `.gz` sibling for every file whose
//! gzip form is strictly smaller than the original, so a static file server
//! can serve pre-compressed content without spending CPU per request.
//!
//! # Features
//!
//! - **Early abort**: compression streams into a buffer capped at the
//!   original size and gives up the moment the cap is hit.
//!
//! - **Idempotent**: files with an existing `.gz` sibling are skipped, so
//!   re-running over a processed tree does no work.
//!
//! - **Deterministic timestamps**: every touched file and artifact gets the
//!   same configured modification time.
//!
//! - **Atomic artifacts**: artifacts are written to `<file>.gz~` and renamed
//!   into place.
//!
//! - **Parallel**: a single walker feeds a bounded queue drained by a fixed
//!   pool of worker threads.
//!
//! # Example
//!
//! ```no_run
//! use pre_compress::recursive;
//! use std::time::SystemTime;
//!
//! let report = recursive("public", SystemTime::UNIX_EPOCH, 4, &["vendor", r".*\.map"]);
//! println!("{} pre-compressed", report.compressed);
//! if let Some(e) = report.error {
//!     eprintln!("failed: {e}");
//! }
//! ```

pub mod compress;
pub mod config;
pub mod error;
pub mod ignore;
pub mod progress;
pub mod walker;

pub use compress::{compress_if_smaller, try_compress, CompressBuffers, CompressOutcome};
pub use config::{CliArgs, RunConfig};
pub use error::{ConfigError, IoOp, PrecompressError, Result, WorkerError};
pub use ignore::IgnorePattern;
pub use walker::{recursive, Precompressor, RunProgress, RunReport, SkipPolicy};
