//! `lamina` executable: staged Ethereum-chain processing drivers.

mod cli;
mod commands;
mod util;

fn main() {
    std::process::exit(cli::run());
}
