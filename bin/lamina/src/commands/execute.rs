//! Block execution driver command.

use std::path::PathBuf;

use clap::Parser;
use lamina_db::DatabaseEnv;
use lamina_stages::{executor::NoopExecutor, ExecutionStage, StageError};
use tracing::{error, info};

use crate::util::parse_size;

/// Store file inside the data directory.
pub(crate) const STORE_FILE_NAME: &str = "data.redb";

/// Execute blocks and write the result into the store.
#[derive(Debug, Parser)]
pub(crate) struct Command {
    /// Path to a populated chain data directory
    #[arg(long, short = 'd', value_name = "PATH")]
    datadir: PathBuf,

    /// Store size hint, e.g. `1TB` (accepted for compatibility; the backend
    /// grows on demand)
    #[arg(long = "map-size", value_name = "SIZE")]
    map_size: Option<String>,

    /// Execute up to this block
    #[arg(long, value_name = "BLOCK", default_value_t = u64::MAX)]
    to: u64,

    /// Batch size in mebibytes of store changes to accumulate before
    /// committing
    #[arg(long, value_name = "MIB", default_value_t = 512)]
    batch_mib: u64,

    /// Chain id forwarded to the executor
    #[arg(long, value_name = "ID", default_value_t = 1)]
    chain_id: u64,
}

impl Command {
    pub(crate) fn execute(self) -> i32 {
        let store = self.datadir.join(STORE_FILE_NAME);
        if !store.is_file() {
            error!("Can't find a valid data file in {}", self.datadir.display());
            return -2
        }

        if let Some(map_size) = &self.map_size {
            let Some(bytes) = parse_size(map_size) else {
                error!("Invalid --map-size value provided: {map_size}");
                return -2
            };
            info!(map_size = bytes, "Store size hint");
        }

        info!("Starting block execution. Store: {}", store.display());
        let env = match DatabaseEnv::create(&store) {
            Ok(env) => env,
            Err(err) => {
                error!("Failed to open the store: {err}");
                return -2
            }
        };

        let mut stage = ExecutionStage::new(
            NoopExecutor,
            self.chain_id,
            self.to,
            self.batch_mib * 1024 * 1024,
        );
        match stage.run(&env) {
            Ok(_) => 0,
            Err(StageError::LegacyReceipts) => {
                error!("Legacy stored receipts are not supported");
                -1
            }
            Err(StageError::Executor { status, store_error }) => {
                error!("Error in execute_blocks: {status:?}, store: {store_error}");
                status.code()
            }
            Err(err) => {
                error!("Error: {err}");
                -2
            }
        }
    }
}
