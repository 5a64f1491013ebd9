//! TabContext CLI: cluster open browser tabs and infer the working context.
//!
//! Reads tabs from a browser's remote-debugging endpoint (or a snapshot file),
//! groups them through a classification service, and keeps the results in a
//! local session database for downstream dashboard generation.

mod backends;
mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
