//! Database environment trait.

use crate::{transaction::DbTxMut, DatabaseError};

/// A handle to an open store environment.
///
/// The core only ever needs read-write transactions: both stage drivers
/// mutate state and hold at most one writer at a time (the backend enforces
/// the single-writer discipline).
pub trait Database {
    /// Read-write transaction type.
    type TXMut: DbTxMut;

    /// Begins a read-write transaction.
    fn tx_mut(&self) -> Result<Self::TXMut, DatabaseError>;
}
