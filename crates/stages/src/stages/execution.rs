use crate::{
    executor::{BlockExecutor, ExecutorStatus},
    StageError,
};
use lamina_db::{
    stages::{get_stage_progress, set_stage_progress, EXECUTION},
    tables, Database, DbTx,
};
use tracing::{error, info};

/// Metadata key of the storage-mode byte that marks a receipt-writing store.
const STORAGE_MODE_RECEIPTS_KEY: &str = "smReceipts";

/// Migrations that must both be present before a receipt-writing store can
/// be executed against; older receipt encodings are refused.
const RECEIPTS_MIGRATIONS: [&str; 2] = ["receipts_cbor_encode", "receipts_store_logs_separately"];

/// The execution stage driver.
///
/// Advances the `Execution` cursor by handing size-bounded batches of
/// canonical blocks to the external [`BlockExecutor`]. The cursor update is
/// written under the same transaction as the batch's state changes and the
/// pair is committed together, so a crash at any point rolls back to the
/// last committed cursor.
#[derive(Debug)]
pub struct ExecutionStage<E> {
    /// The external block executor.
    pub executor: E,
    /// Chain id forwarded to the executor.
    pub chain_id: u64,
    /// Highest block to execute.
    pub to_block: u64,
    /// Batch byte budget handed to the executor per call.
    pub batch_size: u64,
}

impl<E> ExecutionStage<E> {
    /// Creates the driver.
    pub fn new(executor: E, chain_id: u64, to_block: u64, batch_size: u64) -> Self {
        Self { executor, chain_id, to_block, batch_size }
    }

    /// Runs the stage to completion, returning the final cursor.
    pub fn run<DB>(&mut self, db: &DB) -> Result<u64, StageError>
    where
        DB: Database,
        E: BlockExecutor<DB::TXMut>,
    {
        let mut txn = db.tx_mut()?;

        let write_receipts = storage_mode_has_write_receipts(&txn)?;
        if write_receipts && !receipt_migrations_happened(&txn)? {
            return Err(StageError::LegacyReceipts)
        }

        let previous_progress = get_stage_progress(&txn, EXECUTION)?;
        let mut current_progress = previous_progress;
        let mut block_number = previous_progress.saturating_add(1);

        while block_number <= self.to_block {
            let output = self.executor.execute_blocks(
                &txn,
                self.chain_id,
                block_number,
                self.to_block,
                self.batch_size,
                write_receipts,
            );

            if !matches!(output.status, ExecutorStatus::Success | ExecutorStatus::BlockNotFound) {
                error!(
                    target: "sync::stages::execution",
                    status = ?output.status,
                    store_error = output.store_error,
                    "Block execution failed"
                );
                return Err(StageError::Executor {
                    status: output.status,
                    store_error: output.store_error,
                })
            }

            // the durable cursor never moves backwards
            current_progress = current_progress.max(output.new_progress);
            set_stage_progress(&txn, EXECUTION, current_progress)?;
            txn.commit()?;

            if output.status == ExecutorStatus::BlockNotFound {
                break
            }

            info!(target: "sync::stages::execution", "Blocks <= {current_progress} committed");
            txn = db.tx_mut()?;
            block_number = current_progress.saturating_add(1);
        }

        if current_progress > previous_progress {
            info!(
                target: "sync::stages::execution",
                "All blocks <= {current_progress} executed and committed"
            );
        } else {
            info!(target: "sync::stages::execution", "Nothing to execute");
        }

        Ok(current_progress)
    }
}

fn storage_mode_has_write_receipts<Tx: DbTx>(txn: &Tx) -> Result<bool, StageError> {
    let mode = txn.get::<tables::DatabaseInfo>(STORAGE_MODE_RECEIPTS_KEY.to_string())?;
    Ok(matches!(mode.as_deref(), Some([1])))
}

fn receipt_migrations_happened<Tx: DbTx>(txn: &Tx) -> Result<bool, StageError> {
    for migration in RECEIPTS_MIGRATIONS {
        if txn.get::<tables::Migrations>(migration.to_string())?.is_none() {
            return Ok(false)
        }
    }
    Ok(true)
}
