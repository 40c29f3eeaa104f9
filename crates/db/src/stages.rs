//! Stage progress registry.
//!
//! Each sync stage owns a durable cursor: the highest block it has fully
//! processed and committed. Cursors are 8-byte big-endian block numbers in
//! the [`DatabaseInfo`](crate::tables::DatabaseInfo) metadata table, keyed
//! by the stage name. The registry never commits; the caller controls the
//! transaction boundary so a cursor update lands atomically with the state
//! it refers to.

use std::fmt;

use crate::{
    table::Decode,
    tables::DatabaseInfo,
    transaction::{DbTx, DbTxMut},
    DatabaseError,
};

/// Identifier of a sync stage. The string doubles as the on-disk cursor key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(pub &'static str);

/// The block execution stage.
pub const EXECUTION: StageId = StageId("Execution");

/// The account history index stage.
pub const ACCOUNT_HISTORY_INDEX: StageId = StageId("AccountHistoryIndex");

/// The storage history index stage.
pub const STORAGE_HISTORY_INDEX: StageId = StageId("StorageHistoryIndex");

impl StageId {
    /// The stage name.
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Reads the durable cursor of `stage`, or 0 when the stage has never run.
pub fn get_stage_progress<Tx: DbTx>(tx: &Tx, stage: StageId) -> Result<u64, DatabaseError> {
    match tx.get::<DatabaseInfo>(stage.0.to_string())? {
        Some(raw) => u64::decode(&raw),
        None => Ok(0),
    }
}

/// Writes the durable cursor of `stage`.
pub fn set_stage_progress<Tx: DbTxMut>(
    tx: &Tx,
    stage: StageId,
    height: u64,
) -> Result<(), DatabaseError> {
    tx.put::<DatabaseInfo>(stage.0.to_string(), height.to_be_bytes().to_vec())
}
