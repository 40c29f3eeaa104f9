//! Transaction traits: the store contract consumed by the stages.

use crate::{
    cursor::{DbCursorRO, DbCursorRW},
    table::Table,
    DatabaseError,
};

/// Read operations of a transaction.
pub trait DbTx {
    /// Read-only cursor type over table `T`.
    type Cursor<'a, T: Table>: DbCursorRO<T>
    where
        Self: 'a;

    /// Point read.
    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError>;

    /// Number of rows in the table.
    fn entries<T: Table>(&self) -> Result<usize, DatabaseError>;

    /// Opens a read-only cursor over table `T`.
    fn cursor_read<T: Table>(&self) -> Result<Self::Cursor<'_, T>, DatabaseError>;

    /// Commits the transaction, making all writes durable.
    fn commit(self) -> Result<(), DatabaseError>;

    /// Discards the transaction and every write made under it.
    fn abort(self);
}

/// Write operations of a transaction.
pub trait DbTxMut: DbTx {
    /// Read-write cursor type over table `T`.
    type CursorMut<'a, T: Table>: DbCursorRO<T> + DbCursorRW<T>
    where
        Self: 'a;

    /// Inserts or overwrites a row.
    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;

    /// Deletes the row at `key`, reporting whether it existed.
    fn delete<T: Table>(&self, key: T::Key) -> Result<bool, DatabaseError>;

    /// Removes every row of the table.
    fn clear<T: Table>(&self) -> Result<(), DatabaseError>;

    /// Opens a read-write cursor over table `T`.
    fn cursor_write<T: Table>(&self) -> Result<Self::CursorMut<'_, T>, DatabaseError>;
}
