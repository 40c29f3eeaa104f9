//! CLI definition and entrypoint to executable.

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::commands::{execute, history_index};

/// Parses the cli and runs the selected command, returning the process exit
/// code.
pub(crate) fn run() -> i32 {
    let opt = Cli::parse();
    init_tracing(opt.verbose);

    match opt.command {
        Commands::Execute(command) => command.execute(),
        Commands::HistoryIndex(command) => command.execute(),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Staged Ethereum-chain processor", long_about = None)]
struct Cli {
    /// The command to run
    #[command(subcommand)]
    command: Commands,

    /// Use verbose output
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute blocks and write the result into the store
    #[command(name = "execute")]
    Execute(execute::Command),
    /// Generate history indexes from changesets
    #[command(name = "history-index")]
    HistoryIndex(history_index::Command),
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
