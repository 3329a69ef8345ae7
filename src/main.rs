mod append_cmd;
mod apply_cmd;
mod cli;
mod config;
mod convert;
mod logging;
mod train_cmd;

use std::process;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Train(args) => train_cmd::run(args),
        Command::Apply(args) => apply_cmd::run(args),
        Command::Append(args) => append_cmd::run(args),
    }
}
