use crate::executor::ExecutorStatus;
use lamina_db::DatabaseError;

/// Errors that abort a stage run.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The store holds receipts in a pre-migration encoding the core
    /// refuses to run against.
    #[error("legacy stored receipts are not supported")]
    LegacyReceipts,
    /// The block executor reported a fatal status.
    #[error("block executor failed with status {status:?} (store error {store_error})")]
    Executor {
        /// Reported status.
        status: ExecutorStatus,
        /// Store error code forwarded by the executor, 0 when none.
        store_error: i32,
    },
    /// A store operation failed; the active transaction is discarded.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// ETL run file or bitmap serialization I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
