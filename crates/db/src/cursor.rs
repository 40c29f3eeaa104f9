//! Cursor traits over table scans.

use crate::{
    table::{Table, TableRow},
    DatabaseError,
};

/// Result of a cursor positioning operation: the row under the cursor, or
/// `None` once the scan is exhausted.
pub type PairResult<T> = Result<Option<TableRow<T>>, DatabaseError>;

/// A read-only cursor over table `T`.
pub trait DbCursorRO<T: Table> {
    /// Positions the cursor at the first entry of the table.
    fn first(&mut self) -> PairResult<T>;

    /// Positions the cursor at the entry exactly at `key`, if present.
    /// On a miss the cursor keeps its previous position.
    fn seek_exact(&mut self, key: T::Key) -> PairResult<T>;

    /// Positions the cursor at the first entry whose key is `>= key`.
    fn seek(&mut self, key: T::Key) -> PairResult<T>;

    /// Advances to the entry after the current position.
    #[allow(clippy::should_implement_trait)]
    fn next(&mut self) -> PairResult<T>;

    /// Returns an iterator walking forward from `start_key` (or the table
    /// start when `None`).
    fn walk(&mut self, start_key: Option<T::Key>) -> Result<Walker<'_, T, Self>, DatabaseError>
    where
        Self: Sized;
}

/// A read-write cursor over table `T`.
pub trait DbCursorRW<T: Table> {
    /// Inserts the row, overwriting any existing value at the key.
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;

    /// Inserts the row at the end of the table.
    ///
    /// Keys must arrive in non-decreasing order; a key below the current
    /// table end fails with [`DatabaseError::AppendOrder`]. Efficient for
    /// pre-sorted input.
    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError>;
}

/// Forward iterator over a cursor.
#[derive(Debug)]
pub struct Walker<'cursor, T: Table, C: DbCursorRO<T>> {
    cursor: &'cursor mut C,
    start: Option<TableRow<T>>,
}

impl<'cursor, T: Table, C: DbCursorRO<T>> Walker<'cursor, T, C> {
    /// Creates a walker yielding `start` first, then every following row.
    pub fn new(cursor: &'cursor mut C, start: Option<TableRow<T>>) -> Self {
        Self { cursor, start }
    }
}

impl<T: Table, C: DbCursorRO<T>> Iterator for Walker<'_, T, C> {
    type Item = Result<TableRow<T>, DatabaseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(start) = self.start.take() {
            return Some(Ok(start))
        }
        self.cursor.next().transpose()
    }
}
