mod commands;
mod config;
mod error;
mod job;
mod pipeline;
mod pubmed;
mod scheduler;
mod state;
mod store;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use commands::Cli;
use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load env
    let _ = dotenv::dotenv();
    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        keywords = config.search.keywords.len(),
        output = ?config.output.dir,
        "Configuration loaded"
    );

    let state = AppState::new(config)?;
    commands::run(cli.command, &state).await
}
