//! History index driver command.

use std::path::PathBuf;

use clap::Parser;
use lamina_db::DatabaseEnv;
use lamina_stages::{IndexAccountHistoryStage, IndexStorageHistoryStage, StageError};
use tracing::error;

use crate::commands::execute::STORE_FILE_NAME;

/// Generate history indexes from changesets.
#[derive(Debug, Parser)]
pub(crate) struct Command {
    /// Path to a populated chain data directory
    #[arg(long, short = 'd', value_name = "PATH")]
    datadir: PathBuf,

    /// Start making history indexes from block 0
    #[arg(long)]
    full: bool,

    /// Index storage changesets instead of account changesets
    #[arg(long)]
    storage: bool,
}

impl Command {
    pub(crate) fn execute(self) -> i32 {
        let store = self.datadir.join(STORE_FILE_NAME);
        if !store.is_file() {
            error!("Can't find a valid data file in {}", self.datadir.display());
            return -1
        }

        // run files live next to the data directory and are removed with the
        // collector
        let etl_dir = self.datadir.parent().unwrap_or(&self.datadir).join("etl-temp");

        let result = (|| -> Result<(), StageError> {
            std::fs::create_dir_all(&etl_dir)?;
            let env = DatabaseEnv::create(&store)?;
            if self.storage {
                let mut stage = IndexStorageHistoryStage::new(&etl_dir);
                stage.full = self.full;
                stage.run(&env)
            } else {
                let mut stage = IndexAccountHistoryStage::new(&etl_dir);
                stage.full = self.full;
                stage.run(&env)
            }
        })();

        match result {
            Ok(()) => 0,
            Err(err) => {
                error!("{err}");
                -5
            }
        }
    }
}
