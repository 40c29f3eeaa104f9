//! Staged-sync stage drivers.
//!
//! Stages run one at a time, each advancing its own durable cursor: the
//! [`ExecutionStage`] replays canonical blocks through the external block
//! executor in size-bounded batches, and the history index stages transform
//! changesets into per-key chunked block-number bitmaps. All stage state
//! lives inside store transactions; a crash at any point rolls back to the
//! last committed cursor and the driver is simply re-run.

#![warn(missing_debug_implementations, unreachable_pub)]

mod error;
pub mod executor;
pub mod stages;

pub use error::StageError;
pub use stages::{ExecutionStage, IndexAccountHistoryStage, IndexStorageHistoryStage};
