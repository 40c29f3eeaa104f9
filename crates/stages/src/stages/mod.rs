//! Implementations of staged-sync stages.

mod execution;
mod index_account_history;
mod index_storage_history;
mod utils;

pub use execution::ExecutionStage;
pub use index_account_history::IndexAccountHistoryStage;
pub use index_storage_history::IndexStorageHistoryStage;
