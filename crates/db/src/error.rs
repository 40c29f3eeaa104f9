/// Errors surfaced by the storage layer.
///
/// Absent keys are not errors: point reads and seeks return `None` and scans
/// simply terminate. Everything below is fatal for the active transaction.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to open or create the database environment.
    #[error("failed to open the database: {0}")]
    Open(#[from] redb::DatabaseError),
    /// Failed to begin a transaction.
    #[error("failed to begin a transaction: {0}")]
    Transaction(#[from] redb::TransactionError),
    /// Failed to open a named table.
    #[error("failed to open a table: {0}")]
    Table(#[from] redb::TableError),
    /// A read or write inside the store failed.
    #[error("storage operation failed: {0}")]
    Storage(#[from] redb::StorageError),
    /// The transaction could not be committed.
    #[error("failed to commit the transaction: {0}")]
    Commit(#[from] redb::CommitError),
    /// An append-mode write arrived with a key below the current table end.
    #[error("append key is below the last table key")]
    AppendOrder,
    /// A stored value could not be decoded.
    #[error("failed to decode stored data: {0}")]
    Decode(&'static str),
}
