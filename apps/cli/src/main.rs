//! tocscraper CLI: crawl legal-code tables of contents into JSON.
//!
//! Drives a headless Chrome tab through the platform adapters, in single-URL
//! or CSV batch mode.

mod browser;
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
