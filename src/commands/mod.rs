mod once;
mod schedule;
mod status;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::state::AppState;

/// Paper Surfer - weekly PubMed literature collection
#[derive(Parser)]
#[command(name = "paper-surfer", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one collection now
    Once {
        /// Search keyword; repeat to search several. Defaults to the configured list.
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
        /// Maximum results per keyword
        #[arg(short, long)]
        max_results: Option<usize>,
    },
    /// Run on the configured weekly schedule until Ctrl-C
    Schedule,
    /// Show configuration, output and schedule state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run(command: Command, state: &AppState) -> Result<()> {
    match command {
        Command::Once {
            keywords,
            max_results,
        } => once::once(state, keywords, max_results).await,
        Command::Schedule => schedule::schedule(state).await,
        Command::Status { json } => status::status(state, json).await,
    }
}
