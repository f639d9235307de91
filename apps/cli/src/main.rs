//! LeadScout CLI: biotech lead discovery and outreach drafting.
//!
//! Searches trial registries and the web for companies with stalled
//! programs, scores them, drafts outreach emails and exports CSV/JSON.

mod commands;
mod prompt;

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
