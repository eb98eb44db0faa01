//! cyberscan - a concurrent network port scanner.

use anyhow::Context;
use clap::Parser;
use cyberscan::cli::Cli;
use cyberscan::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    cli.execute().await.context("scan failed")?;
    Ok(())
}
