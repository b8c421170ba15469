use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::state::AppState;

/// Run the weekly schedule until Ctrl-C.
pub async fn schedule(state: &AppState) -> Result<()> {
    if !state.config.schedule.enabled {
        println!("Scheduling is disabled (SCHEDULE_ENABLED=false).");
        return Ok(());
    }

    let engine = state.engine(Arc::new(state.job(Vec::new(), None)));
    engine.start().await;
    if let Some(next) = engine.next_run().await {
        println!("Next run: {}", next.format("%Y-%m-%d %H:%M:%S"));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupt received, stopping scheduler");
    engine.stop().await;
    Ok(())
}
