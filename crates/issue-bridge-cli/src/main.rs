//! `discord-issue-bridge`: one sync batch per invocation, meant to be run
//! from a non-overlapping scheduler.

mod bootstrap;
mod cli_args;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap::{init_tracing, run_bridge};
use crate::cli_args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let report = run_bridge(&cli)?;
    tracing::info!(
        fetched = report.fetched,
        skipped = report.skipped,
        created = report.created,
        previewed = report.previewed,
        "bridge run complete"
    );
    Ok(())
}
