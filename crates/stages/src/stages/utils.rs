//! Shared machinery of the history index stages.
//!
//! Extract: scan a changeset table from the stage cursor, group block
//! numbers per history key into in-memory bitmaps, and spill them through
//! the ETL collector once the buffer budget is hit. Load: merge-sort the
//! collected bitmaps per key, fold in the current tail chunk from the
//! target table, and re-chunk into size-capped records keyed by
//! `history_key ‖ be_u64(max_block)` with `u64::MAX` marking the tail.

use std::{collections::HashMap, path::Path, sync::Arc};

use crate::StageError;
use lamina_db::{
    bitmap::{self, BITMAP_CHUNK_LIMIT},
    cursor::{DbCursorRO, DbCursorRW},
    stages::{get_stage_progress, set_stage_progress, StageId, EXECUTION},
    table::Table,
    Database, DatabaseError, DbTx, DbTxMut,
};
use lamina_etl::{Collector, Entry, EtlSink, LoadMode};
use roaring::RoaringTreemap;
use tracing::info;

/// Budget for the in-memory bitmap buffer during extraction: estimated as
/// 64 bytes of map overhead per key plus 8 bytes per inserted block.
pub(crate) const BITMAP_BUFFER_SIZE_LIMIT: usize = 256 * 1024 * 1024;

/// Default ETL collector flush threshold.
pub(crate) const DEFAULT_ETL_FLUSH_SIZE: usize = 512 * 1024 * 1024;

const KEY_HASH_LENGTH: usize = 32;
const ADDRESS_LENGTH: usize = 20;
const INCARNATION_LENGTH: usize = 8;
const BLOCK_NUMBER_LENGTH: usize = 8;

/// Derives the history key from a changeset key payload (the part after the
/// block-number prefix) by removing the incarnation field sitting between
/// the two halves. Unrecognized shapes pass through unchanged.
pub(crate) fn history_key(payload: &[u8]) -> Vec<u8> {
    if payload.len() == 2 * KEY_HASH_LENGTH + INCARNATION_LENGTH {
        [&payload[..KEY_HASH_LENGTH], &payload[KEY_HASH_LENGTH + INCARNATION_LENGTH..]].concat()
    } else if payload.len() == ADDRESS_LENGTH + INCARNATION_LENGTH + KEY_HASH_LENGTH {
        [&payload[..ADDRESS_LENGTH], &payload[ADDRESS_LENGTH + INCARNATION_LENGTH..]].concat()
    } else {
        payload.to_vec()
    }
}

/// Runs a history index stage end to end: extract, load, cursor update,
/// commit. An empty changeset range is a no-op and commits nothing.
pub(crate) fn run_index<DB, CS, H>(
    db: &DB,
    stage: StageId,
    etl_dir: &Path,
    flush_size: usize,
    full: bool,
) -> Result<(), StageError>
where
    DB: Database,
    CS: Table<Key = Vec<u8>, Value = Vec<u8>>,
    H: Table<Key = Vec<u8>, Value = Vec<u8>>,
{
    let txn = db.tx_mut()?;
    let previous_progress = if full { 0 } else { get_stage_progress(&txn, stage)? };
    info!(
        target: "sync::stages::index_history",
        stage = %stage,
        from_block = previous_progress + 1,
        "Started index extraction"
    );

    let dir = Arc::new(tempfile::Builder::new().prefix("etl-").tempdir_in(etl_dir)?);
    let mut collector = Collector::new(dir, flush_size);
    collect_bitmaps::<_, CS>(&txn, &mut collector, previous_progress + 1, BITMAP_BUFFER_SIZE_LIMIT)?;

    if collector.is_empty() {
        info!(target: "sync::stages::index_history", stage = %stage, "Nothing to process");
        return Ok(())
    }

    info!(
        target: "sync::stages::index_history",
        stage = %stage,
        entries = collector.len(),
        "Started loading"
    );
    load_history::<_, H>(&txn, collector)?;

    // the history never runs ahead of what execution has made durable
    let execution_progress = get_stage_progress(&txn, EXECUTION)?;
    set_stage_progress(&txn, stage, execution_progress)?;
    txn.commit()?;

    info!(
        target: "sync::stages::index_history",
        stage = %stage,
        progress = execution_progress,
        "All done"
    );
    Ok(())
}

/// Extraction loop: groups changed-block numbers per history key and spills
/// serialized bitmaps into the collector whenever the buffer budget is
/// exceeded, plus once at the end of the scan.
pub(crate) fn collect_bitmaps<Tx, CS>(
    txn: &Tx,
    collector: &mut Collector,
    start_block: u64,
    buffer_size_limit: usize,
) -> Result<(), StageError>
where
    Tx: DbTx,
    CS: Table<Key = Vec<u8>, Value = Vec<u8>>,
{
    let mut changesets = txn.cursor_read::<CS>()?;
    let mut bitmaps: HashMap<Vec<u8>, RoaringTreemap> = HashMap::new();
    let mut allocated = 0usize;

    for entry in changesets.walk(Some(start_block.to_be_bytes().to_vec()))? {
        let (changeset_key, _) = entry?;
        if changeset_key.len() < BLOCK_NUMBER_LENGTH {
            return Err(DatabaseError::Decode("changeset key shorter than its block prefix").into())
        }
        let (block, payload) = changeset_key.split_at(BLOCK_NUMBER_LENGTH);
        let block_number = u64::from_be_bytes(block.try_into().expect("split at 8"));

        bitmaps.entry(history_key(payload)).or_default().insert(block_number);
        allocated += 8;

        if 64 * bitmaps.len() + allocated > buffer_size_limit {
            flush_bitmaps(&mut bitmaps, collector)?;
            allocated = 0;
            info!(target: "sync::stages::index_history", block = block_number, "Flushed bitmap buffer");
        }
    }

    flush_bitmaps(&mut bitmaps, collector)?;
    Ok(())
}

fn flush_bitmaps(
    bitmaps: &mut HashMap<Vec<u8>, RoaringTreemap>,
    collector: &mut Collector,
) -> Result<(), StageError> {
    for (key, bm) in bitmaps.drain() {
        collector.collect(Entry::new(key, bitmap::serialize(&bm)?))?;
    }
    Ok(())
}

/// Load step: drains the collector into the history table.
///
/// Per key, the collected bitmap is merged with the current tail chunk (a
/// write transaction reads its own writes, so keys spilled across several
/// collector runs fold together correctly) and re-cut into chunks within
/// [`BITMAP_CHUNK_LIMIT`]. Every chunk is keyed by its highest block; the
/// last one gets the `u64::MAX` suffix and stays the merge target for the
/// next run.
pub(crate) fn load_history<Tx, H>(txn: &Tx, collector: Collector) -> Result<(), StageError>
where
    Tx: DbTxMut,
    H: Table<Key = Vec<u8>, Value = Vec<u8>>,
{
    // append is only valid when the table is known to be empty; reruns must
    // upsert because chunk keys interleave with existing ones
    let mode =
        if txn.entries::<H>()? == 0 { LoadMode::AppendDup } else { LoadMode::Upsert };

    let mut sink = HistorySink::<Tx, H>::new(txn)?;
    collector.load(&mut sink, mode, 10, |entry, sink| {
        let mut bm = bitmap::deserialize(&entry.value)?;
        if let Some(tail) = sink.tail_chunk(&entry.key)? {
            bm |= bitmap::deserialize(&tail)?;
        }

        let mut out = Vec::new();
        while !bm.is_empty() {
            let chunk = bitmap::cut_left(&mut bm, BITMAP_CHUNK_LIMIT);
            let suffix =
                if bm.is_empty() { u64::MAX } else { chunk.max().expect("chunk is not empty") };
            out.push(Entry::new(bitmap::chunk_key(&entry.key, suffix), bitmap::serialize(&chunk)?));
        }
        Ok(out)
    })
}

/// Write half of the load step: a cursor into the history table plus tail
/// lookups through the owning transaction.
pub(crate) struct HistorySink<'a, Tx: DbTxMut, H: Table> {
    txn: &'a Tx,
    cursor: Tx::CursorMut<'a, H>,
}

impl<'a, Tx, H> HistorySink<'a, Tx, H>
where
    Tx: DbTxMut,
    H: Table<Key = Vec<u8>, Value = Vec<u8>>,
{
    fn new(txn: &'a Tx) -> Result<Self, DatabaseError> {
        Ok(Self { txn, cursor: txn.cursor_write::<H>()? })
    }

    /// Reads the current tail chunk for `key`, if any.
    fn tail_chunk(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DatabaseError> {
        self.txn.get::<H>(bitmap::chunk_key(key, u64::MAX))
    }
}

impl<Tx, H> EtlSink for HistorySink<'_, Tx, H>
where
    Tx: DbTxMut,
    H: Table<Key = Vec<u8>, Value = Vec<u8>>,
{
    type Error = StageError;

    fn write(&mut self, key: Vec<u8>, value: Vec<u8>, mode: LoadMode) -> Result<(), StageError> {
        match mode {
            LoadMode::AppendDup => self.cursor.append(key, value)?,
            LoadMode::Upsert => self.cursor.upsert(key, value)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_db::{tables::AccountHistory, DatabaseEnv};
    use tempfile::TempDir;

    #[test]
    fn history_key_strips_incarnation() {
        let hashed: Vec<u8> = (0u8..72).collect();
        let stripped = history_key(&hashed);
        assert_eq!(stripped.len(), 64);
        assert_eq!(&stripped[..32], &hashed[..32]);
        assert_eq!(&stripped[32..], &hashed[40..]);

        let plain: Vec<u8> = (0u8..60).collect();
        let stripped = history_key(&plain);
        assert_eq!(stripped.len(), 52);
        assert_eq!(&stripped[..20], &plain[..20]);
        assert_eq!(&stripped[20..], &plain[28..]);

        // anything else passes through
        assert_eq!(history_key(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn load_merges_keys_spilled_across_runs() {
        let dir = TempDir::new().unwrap();
        let env = DatabaseEnv::create(dir.path().join("data.redb")).unwrap();
        let txn = env.tx_mut().unwrap();

        // two collector entries for the same key, as left behind by two
        // extraction flushes
        let collector_dir = Arc::new(TempDir::new().unwrap());
        let mut collector = Collector::new(collector_dir, 1 << 20);
        let key = b"key".to_vec();
        let first: RoaringTreemap = [100u64].into_iter().collect();
        let second: RoaringTreemap = [200u64].into_iter().collect();
        collector.collect(Entry::new(key.clone(), bitmap::serialize(&first).unwrap())).unwrap();
        collector.collect(Entry::new(key.clone(), bitmap::serialize(&second).unwrap())).unwrap();

        load_history::<_, AccountHistory>(&txn, collector).unwrap();

        // the second entry folded the freshly written tail back in
        let tail = txn.get::<AccountHistory>(bitmap::chunk_key(&key, u64::MAX)).unwrap().unwrap();
        let merged = bitmap::deserialize(&tail).unwrap();
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec![100, 200]);
        assert_eq!(txn.entries::<AccountHistory>().unwrap(), 1);
    }

    #[test]
    fn extraction_flushes_on_buffer_budget() {
        let dir = TempDir::new().unwrap();
        let env = DatabaseEnv::create(dir.path().join("data.redb")).unwrap();
        let txn = env.tx_mut().unwrap();
        for block in 1u64..=10 {
            let mut key = block.to_be_bytes().to_vec();
            key.extend_from_slice(&[0xAA; 20]);
            txn.put::<lamina_db::tables::PlainAccountChangeSet>(key, vec![]).unwrap();
        }

        let collector_dir = Arc::new(TempDir::new().unwrap());
        let mut collector = Collector::new(collector_dir, 1 << 20);
        // budget small enough that every insert overflows it
        collect_bitmaps::<_, lamina_db::tables::PlainAccountChangeSet>(
            &txn,
            &mut collector,
            1,
            1,
        )
        .unwrap();

        // one spilled entry per flush, all for the same key
        assert_eq!(collector.len(), 10);
    }
}
