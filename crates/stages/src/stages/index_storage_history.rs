use std::path::PathBuf;

use crate::{
    stages::utils::{run_index, DEFAULT_ETL_FLUSH_SIZE},
    StageError,
};
use lamina_db::{
    stages::STORAGE_HISTORY_INDEX,
    tables::{PlainStorageChangeSet, StorageHistory},
    Database,
};

/// Stage indexing the storage changesets produced by the execution stage.
///
/// Works exactly like the account variant, except that storage changeset
/// keys carry an incarnation field between the address (or address hash)
/// and the storage location, which is stripped out of the history key.
#[derive(Debug)]
pub struct IndexStorageHistoryStage {
    /// Restart indexing from block 0 instead of the stage cursor. The
    /// target table must have been cleared by the caller.
    pub full: bool,
    /// Parent directory for ETL run files.
    pub etl_dir: PathBuf,
    /// Collector flush threshold in bytes.
    pub flush_size: usize,
}

impl IndexStorageHistoryStage {
    /// Creates the stage with the default flush threshold.
    pub fn new(etl_dir: impl Into<PathBuf>) -> Self {
        Self { full: false, etl_dir: etl_dir.into(), flush_size: DEFAULT_ETL_FLUSH_SIZE }
    }

    /// Runs the stage and commits on success.
    pub fn run<DB: Database>(&self, db: &DB) -> Result<(), StageError> {
        run_index::<DB, PlainStorageChangeSet, StorageHistory>(
            db,
            STORAGE_HISTORY_INDEX,
            &self.etl_dir,
            self.flush_size,
            self.full,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_db::{
        bitmap,
        cursor::DbCursorRO,
        stages::{get_stage_progress, set_stage_progress, EXECUTION, STORAGE_HISTORY_INDEX},
        DatabaseEnv, DbTx, DbTxMut,
    };
    use roaring::RoaringTreemap;
    use tempfile::TempDir;

    const ADDRESS: [u8; 20] = [0x42; 20];
    const INCARNATION: [u8; 8] = 1u64.to_be_bytes();
    const LOCATION: [u8; 32] = [0x07; 32];

    fn changeset_key(block: u64) -> Vec<u8> {
        [block.to_be_bytes().as_slice(), &ADDRESS, &INCARNATION, &LOCATION].concat()
    }

    fn setup() -> (TempDir, DatabaseEnv, IndexStorageHistoryStage) {
        let dir = TempDir::new().unwrap();
        let env = DatabaseEnv::create(dir.path().join("data.redb")).unwrap();
        let etl_dir = dir.path().join("etl-temp");
        std::fs::create_dir_all(&etl_dir).unwrap();
        let stage = IndexStorageHistoryStage {
            full: false,
            etl_dir,
            flush_size: 1 << 20,
        };
        (dir, env, stage)
    }

    #[test]
    fn strips_incarnation_from_history_keys() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        txn.put::<PlainStorageChangeSet>(changeset_key(7), vec![]).unwrap();
        txn.put::<PlainStorageChangeSet>(changeset_key(9), vec![]).unwrap();
        set_stage_progress(&txn, EXECUTION, 9).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        let txn = env.tx_mut().unwrap();
        let mut cursor = txn.cursor_read::<StorageHistory>().unwrap();
        let rows: Vec<_> = cursor.walk(None).unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);

        // address ‖ location, no incarnation, then the tail suffix
        let expected_key = [ADDRESS.as_slice(), &LOCATION].concat();
        assert_eq!(rows[0].0, bitmap::chunk_key(&expected_key, u64::MAX));
        let bm: RoaringTreemap = bitmap::deserialize(&rows[0].1).unwrap();
        assert_eq!(bm.iter().collect::<Vec<_>>(), vec![7, 9]);

        assert_eq!(get_stage_progress(&txn, STORAGE_HISTORY_INDEX).unwrap(), 9);
    }

    #[test]
    fn locations_of_one_address_index_separately() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        let mut other = changeset_key(7);
        let len = other.len();
        other[len - 1] ^= 0xFF;
        txn.put::<PlainStorageChangeSet>(changeset_key(7), vec![]).unwrap();
        txn.put::<PlainStorageChangeSet>(other, vec![]).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        let txn = env.tx_mut().unwrap();
        assert_eq!(txn.entries::<StorageHistory>().unwrap(), 2);
    }
}
