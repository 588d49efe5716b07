//! Parallel pre-compression pipeline
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │       TreeWalker        │
//!                     │  - caller's thread      │
//!                     │  - sorted listings      │
//!                     └───────────┬─────────────┘
//!                                 │ relative paths
//!                     ┌───────────▼─────────────┐
//!                     │   Work Queue (bounded)  │
//!                     └───────────┬─────────────┘
//!       ┌─────────────────────────┼─────────────────────────┐
//!       │                         │                         │
//! ┌─────▼─────┐             ┌─────▼─────┐             ┌─────▼─────┐
//! │  Worker 1 │             │  Worker 2 │             │  Worker N │
//! │  gzip     │             │  gzip     │             │  gzip     │
//! └─────┬─────┘             └─────┬─────┘             └─────┬─────┘
//!       └─────────────────────────┼─────────────────────────┘
//!                     ┌───────────▼─────────────┐
//!                     │ RunOutcome: count + 1st │
//!                     │ error                   │
//!                     └─────────────────────────┘
//! ```

pub mod coordinator;
pub mod queue;
pub mod tree;
pub mod worker;

pub use coordinator::{recursive, Precompressor, RunProgress, RunReport};
pub use queue::{WorkItem, WorkQueue};
pub use tree::{SkipPolicy, TreeWalker, WalkStats};
pub use worker::{PoolStats, RunOutcome};
