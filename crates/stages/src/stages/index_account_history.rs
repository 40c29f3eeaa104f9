use std::path::PathBuf;

use crate::{
    stages::utils::{run_index, DEFAULT_ETL_FLUSH_SIZE},
    StageError,
};
use lamina_db::{
    stages::ACCOUNT_HISTORY_INDEX,
    tables::{AccountHistory, PlainAccountChangeSet},
    Database,
};

/// Stage indexing the account changesets produced by the execution stage
/// into per-address chunked block-number bitmaps.
#[derive(Debug)]
pub struct IndexAccountHistoryStage {
    /// Restart indexing from block 0 instead of the stage cursor. The
    /// target table must have been cleared by the caller.
    pub full: bool,
    /// Parent directory for ETL run files.
    pub etl_dir: PathBuf,
    /// Collector flush threshold in bytes.
    pub flush_size: usize,
}

impl IndexAccountHistoryStage {
    /// Creates the stage with the default flush threshold.
    pub fn new(etl_dir: impl Into<PathBuf>) -> Self {
        Self { full: false, etl_dir: etl_dir.into(), flush_size: DEFAULT_ETL_FLUSH_SIZE }
    }

    /// Runs the stage and commits on success.
    pub fn run<DB: Database>(&self, db: &DB) -> Result<(), StageError> {
        run_index::<DB, PlainAccountChangeSet, AccountHistory>(
            db,
            ACCOUNT_HISTORY_INDEX,
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
        stages::{get_stage_progress, set_stage_progress, EXECUTION},
        DatabaseEnv, DbTx, DbTxMut,
    };
    use roaring::RoaringTreemap;
    use tempfile::TempDir;

    const ADDRESS: [u8; 20] = [0x42; 20];

    fn changeset_key(block: u64) -> Vec<u8> {
        [block.to_be_bytes().as_slice(), &ADDRESS].concat()
    }

    fn setup() -> (TempDir, DatabaseEnv, IndexAccountHistoryStage) {
        let dir = TempDir::new().unwrap();
        let env = DatabaseEnv::create(dir.path().join("data.redb")).unwrap();
        let etl_dir = dir.path().join("etl-temp");
        std::fs::create_dir_all(&etl_dir).unwrap();
        let stage = IndexAccountHistoryStage {
            full: false,
            etl_dir,
            flush_size: 1 << 20,
        };
        (dir, env, stage)
    }

    fn history_rows(env: &DatabaseEnv) -> Vec<(Vec<u8>, Vec<u8>)> {
        let txn = env.tx_mut().unwrap();
        let mut cursor = txn.cursor_read::<AccountHistory>().unwrap();
        cursor.walk(None).unwrap().collect::<Result<Vec<_>, _>>().unwrap()
    }

    fn bitmap_of(values: impl IntoIterator<Item = u64>) -> RoaringTreemap {
        values.into_iter().collect()
    }

    #[test]
    fn indexes_changesets_into_empty_table() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        txn.put::<PlainAccountChangeSet>(changeset_key(100), vec![]).unwrap();
        txn.put::<PlainAccountChangeSet>(changeset_key(200), vec![]).unwrap();
        set_stage_progress(&txn, EXECUTION, 200).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        let rows = history_rows(&env);
        assert_eq!(rows.len(), 1);
        let (key, value) = &rows[0];
        assert_eq!(key, &bitmap::chunk_key(&ADDRESS, u64::MAX));
        assert_eq!(bitmap::deserialize(value).unwrap(), bitmap_of([100, 200]));

        // the stage cursor lands on whatever execution has made durable
        let txn = env.tx_mut().unwrap();
        assert_eq!(get_stage_progress(&txn, ACCOUNT_HISTORY_INDEX).unwrap(), 200);
    }

    #[test]
    fn rerun_merges_new_blocks_into_tail() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        txn.put::<AccountHistory>(
            bitmap::chunk_key(&ADDRESS, u64::MAX),
            bitmap::serialize(&bitmap_of([100, 200])).unwrap(),
        )
        .unwrap();
        txn.put::<PlainAccountChangeSet>(changeset_key(300), vec![]).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        let rows = history_rows(&env);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, bitmap::chunk_key(&ADDRESS, u64::MAX));
        assert_eq!(bitmap::deserialize(&rows[0].1).unwrap(), bitmap_of([100, 200, 300]));
    }

    #[test]
    fn oversized_bitmap_splits_into_ascending_chunks() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        for block in 1u64..=4_000 {
            txn.put::<PlainAccountChangeSet>(changeset_key(block), vec![]).unwrap();
        }
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        let rows = history_rows(&env);
        assert!(rows.len() >= 2);

        let mut reassembled = RoaringTreemap::new();
        let mut previous_suffix = 0u64;
        for (i, (key, value)) in rows.iter().enumerate() {
            assert_eq!(&key[..20], ADDRESS.as_slice());
            assert!(value.len() <= bitmap::BITMAP_CHUNK_LIMIT as usize);

            let suffix = u64::from_be_bytes(key[20..].try_into().unwrap());
            assert!(suffix > previous_suffix);
            previous_suffix = suffix;

            let chunk = bitmap::deserialize(value).unwrap();
            if i + 1 == rows.len() {
                assert_eq!(suffix, u64::MAX);
            } else {
                assert_eq!(suffix, chunk.max().unwrap());
            }
            reassembled |= chunk;
        }
        assert_eq!(reassembled, bitmap_of(1..=4_000));
    }

    #[test]
    fn empty_changeset_range_is_a_noop() {
        let (_dir, env, stage) = setup();
        let txn = env.tx_mut().unwrap();
        set_stage_progress(&txn, EXECUTION, 50).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();

        assert!(history_rows(&env).is_empty());
        // nothing was committed for the stage either
        let txn = env.tx_mut().unwrap();
        assert_eq!(get_stage_progress(&txn, ACCOUNT_HISTORY_INDEX).unwrap(), 0);
    }

    #[test]
    fn full_restarts_from_block_zero() {
        let (_dir, env, mut stage) = setup();
        let txn = env.tx_mut().unwrap();
        txn.put::<PlainAccountChangeSet>(changeset_key(100), vec![]).unwrap();
        // cursor past the data: an incremental run scans nothing
        set_stage_progress(&txn, ACCOUNT_HISTORY_INDEX, 500).unwrap();
        txn.commit().unwrap();

        stage.run(&env).unwrap();
        assert!(history_rows(&env).is_empty());

        stage.full = true;
        stage.run(&env).unwrap();
        let rows = history_rows(&env);
        assert_eq!(rows.len(), 1);
        assert_eq!(bitmap::deserialize(&rows[0].1).unwrap(), bitmap_of([100]));
    }
}
