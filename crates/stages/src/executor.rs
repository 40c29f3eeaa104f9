//! The block executor contract.
//!
//! The EVM executor is an external collaborator. It receives the open
//! transaction handle, mutates arbitrary state under it, and reports the
//! highest block it fully applied. The driver only interprets the returned
//! status; everything else about execution is opaque.

/// Outcome classes reported by the block executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorStatus {
    /// The batch was applied up to the byte budget or the target block.
    Success,
    /// The next block is not in the store; the known chain head was reached.
    /// Terminal for the driver, but not an error.
    BlockNotFound,
    /// The chain id is not supported.
    UnknownChainId,
    /// The store failed underneath the executor; see the store error code.
    StoreError,
    /// A block was missing recovered senders.
    MissingSenders,
    /// Block validation failed.
    InvalidBlock,
    /// A stored block or receipt could not be decoded.
    DecodingError,
    /// Any other failure.
    UnknownError,
}

impl ExecutorStatus {
    /// Stable numeric code; fatal codes double as process exit codes.
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::BlockNotFound => 1,
            Self::UnknownChainId => 2,
            Self::StoreError => 3,
            Self::MissingSenders => 4,
            Self::InvalidBlock => 5,
            Self::DecodingError => 6,
            Self::UnknownError => 7,
        }
    }
}

/// Result of one executor batch call.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOutput {
    /// Reported outcome.
    pub status: ExecutorStatus,
    /// Highest block fully applied under the transaction.
    pub new_progress: u64,
    /// Store error code when `status` is [`ExecutorStatus::StoreError`],
    /// 0 otherwise.
    pub store_error: i32,
}

/// Executes batches of canonical blocks against the state under `Tx`.
pub trait BlockExecutor<Tx> {
    /// Executes blocks `from_block..=to_block` until the batch byte budget
    /// is exhausted, the target is reached, a block is missing, or a fatal
    /// error occurs.
    fn execute_blocks(
        &mut self,
        txn: &Tx,
        chain_id: u64,
        from_block: u64,
        to_block: u64,
        batch_size: u64,
        write_receipts: bool,
    ) -> ExecutorOutput;
}

/// Executor that applies no blocks and reports the first requested block as
/// not found. Stands in at the integration seam until a real EVM
/// implementation is linked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl<Tx> BlockExecutor<Tx> for NoopExecutor {
    fn execute_blocks(
        &mut self,
        _txn: &Tx,
        _chain_id: u64,
        from_block: u64,
        _to_block: u64,
        _batch_size: u64,
        _write_receipts: bool,
    ) -> ExecutorOutput {
        ExecutorOutput {
            status: ExecutorStatus::BlockNotFound,
            new_progress: from_block.saturating_sub(1),
            store_error: 0,
        }
    }
}
