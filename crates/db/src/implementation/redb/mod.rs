//! redb-backed store environment.
//!
//! redb provides the same transactional contract the core was written
//! against an LMDB-like store for: named B-tree tables with byte-ordered
//! keys, a single writer at a time, and atomic durable commits. Cursors are
//! realized as position-tracked range reads; every operation opens the
//! table handle for just its own duration, so any number of cursors may
//! coexist on one transaction.

use std::{marker::PhantomData, ops::Bound, path::Path};

use redb::{ReadableTable, ReadableTableMetadata, TableDefinition, WriteTransaction};

use crate::{
    cursor::{DbCursorRO, DbCursorRW, PairResult, Walker},
    database::Database,
    table::{Compress, Decode, Decompress, Encode, Table, TableRow},
    tables::TABLES,
    transaction::{DbTx, DbTxMut},
    DatabaseError,
};

fn def<T: Table>() -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    TableDefinition::new(T::NAME)
}

/// An open store environment.
#[derive(Debug)]
pub struct DatabaseEnv {
    db: redb::Database,
}

impl DatabaseEnv {
    /// Opens the environment at `path`, creating the file and every named
    /// table on first use.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let db = redb::Database::create(path)?;
        let tx = db.begin_write()?;
        for table in TABLES {
            tx.open_table(TableDefinition::<&[u8], &[u8]>::new(table))?;
        }
        tx.commit()?;
        Ok(Self { db })
    }
}

impl Database for DatabaseEnv {
    type TXMut = Tx;

    fn tx_mut(&self) -> Result<Tx, DatabaseError> {
        Ok(Tx { inner: self.db.begin_write()? })
    }
}

/// A read-write transaction.
pub struct Tx {
    inner: WriteTransaction,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").finish_non_exhaustive()
    }
}

impl Tx {
    fn open<T: Table>(
        &self,
    ) -> Result<redb::Table<'_, &'static [u8], &'static [u8]>, DatabaseError> {
        Ok(self.inner.open_table(def::<T>())?)
    }
}

impl DbTx for Tx {
    type Cursor<'a, T: Table>
        = Cursor<'a, T>
    where
        Self: 'a;

    fn get<T: Table>(&self, key: T::Key) -> Result<Option<T::Value>, DatabaseError> {
        let key = key.encode();
        let table = self.open::<T>()?;
        let result = match table.get(key.as_ref())? {
            Some(guard) => Ok(Some(T::Value::decompress(guard.value())?)),
            None => Ok(None),
        };
        result
    }

    fn entries<T: Table>(&self) -> Result<usize, DatabaseError> {
        Ok(self.open::<T>()?.len()? as usize)
    }

    fn cursor_read<T: Table>(&self) -> Result<Cursor<'_, T>, DatabaseError> {
        Ok(Cursor::new(self))
    }

    fn commit(self) -> Result<(), DatabaseError> {
        Ok(self.inner.commit()?)
    }

    fn abort(self) {
        let _ = self.inner.abort();
    }
}

impl DbTxMut for Tx {
    type CursorMut<'a, T: Table>
        = Cursor<'a, T>
    where
        Self: 'a;

    fn put<T: Table>(&self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode();
        let value = value.compress();
        let mut table = self.open::<T>()?;
        table.insert(key.as_ref(), value.as_ref())?;
        Ok(())
    }

    fn delete<T: Table>(&self, key: T::Key) -> Result<bool, DatabaseError> {
        let key = key.encode();
        let mut table = self.open::<T>()?;
        let existed = table.remove(key.as_ref())?.is_some();
        Ok(existed)
    }

    fn clear<T: Table>(&self) -> Result<(), DatabaseError> {
        // dropping the table; the next open recreates it empty
        self.inner.delete_table(def::<T>())?;
        Ok(())
    }

    fn cursor_write<T: Table>(&self) -> Result<Cursor<'_, T>, DatabaseError> {
        Ok(Cursor::new(self))
    }
}

/// Tracked cursor position over the encoded key space.
#[derive(Debug)]
enum Position {
    /// Before the first row; `next` behaves like `first`.
    Start,
    /// On the row with this encoded key.
    At(Vec<u8>),
    /// Past the last row.
    End,
}

/// A cursor over table `T`.
///
/// The position is the encoded key the cursor last returned; stepping reads
/// the smallest key strictly above it, so deletes and inserts behind the
/// cursor never disturb the scan.
pub struct Cursor<'tx, T: Table> {
    tx: &'tx Tx,
    position: Position,
    _table: PhantomData<T>,
}

impl<T: Table> std::fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("position", &self.position).finish_non_exhaustive()
    }
}

impl<'tx, T: Table> Cursor<'tx, T> {
    fn new(tx: &'tx Tx) -> Self {
        Self { tx, position: Position::Start, _table: PhantomData }
    }

    fn decode_row(key: &[u8], value: &[u8]) -> Result<TableRow<T>, DatabaseError> {
        Ok((T::Key::decode(key)?, T::Value::decompress(value)?))
    }

    /// Positions the cursor at the first row within `bounds`.
    fn read_from(&mut self, bounds: (Bound<&[u8]>, Bound<&[u8]>)) -> PairResult<T> {
        let table = self.tx.open::<T>()?;
        let next = table.range::<&[u8]>(bounds)?.next().transpose()?;
        match next {
            Some((key, value)) => {
                let raw_key = key.value().to_vec();
                let row = Self::decode_row(&raw_key, value.value())?;
                self.position = Position::At(raw_key);
                Ok(Some(row))
            }
            None => {
                self.position = Position::End;
                Ok(None)
            }
        }
    }
}

impl<T: Table> DbCursorRO<T> for Cursor<'_, T> {
    fn first(&mut self) -> PairResult<T> {
        self.read_from((Bound::Unbounded, Bound::Unbounded))
    }

    fn seek_exact(&mut self, key: T::Key) -> PairResult<T> {
        let key = key.encode();
        let table = self.tx.open::<T>()?;
        let row = match table.get(key.as_ref())? {
            Some(guard) => Some(Self::decode_row(key.as_ref(), guard.value())?),
            None => None,
        };
        drop(table);
        if row.is_some() {
            self.position = Position::At(key.as_ref().to_vec());
        }
        Ok(row)
    }

    fn seek(&mut self, key: T::Key) -> PairResult<T> {
        let key = key.encode();
        self.read_from((Bound::Included(key.as_ref()), Bound::Unbounded))
    }

    fn next(&mut self) -> PairResult<T> {
        match std::mem::replace(&mut self.position, Position::End) {
            Position::Start => self.first(),
            Position::At(key) => {
                self.read_from((Bound::Excluded(key.as_slice()), Bound::Unbounded))
            }
            Position::End => Ok(None),
        }
    }

    fn walk(&mut self, start_key: Option<T::Key>) -> Result<Walker<'_, T, Self>, DatabaseError> {
        let start = match start_key {
            Some(key) => self.seek(key)?,
            None => self.first()?,
        };
        Ok(Walker::new(self, start))
    }
}

impl<T: Table> DbCursorRW<T> for Cursor<'_, T> {
    fn upsert(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode();
        let value = value.compress();
        let mut table = self.tx.open::<T>()?;
        table.insert(key.as_ref(), value.as_ref())?;
        drop(table);
        self.position = Position::At(key.as_ref().to_vec());
        Ok(())
    }

    fn append(&mut self, key: T::Key, value: T::Value) -> Result<(), DatabaseError> {
        let key = key.encode();
        let value = value.compress();
        let mut table = self.tx.open::<T>()?;
        if let Some((last, _)) = table.last()? {
            if key.as_ref() < last.value() {
                return Err(DatabaseError::AppendOrder)
            }
        }
        table.insert(key.as_ref(), value.as_ref())?;
        drop(table);
        self.position = Position::At(key.as_ref().to_vec());
        Ok(())
    }
}
