use std::sync::Arc;

use anyhow::Result;

use crate::pubmed::types::Relevance;
use crate::state::AppState;

/// Run a single collection through the scheduler and print what it produced.
pub async fn once(state: &AppState, keywords: Vec<String>, max_results: Option<usize>) -> Result<()> {
    let job = Arc::new(state.job(keywords, max_results));
    state.engine(job.clone()).run_once().await;
    let collected = job.take_last().await.unwrap_or_default();

    println!("Papers found: {}", collected.found);
    println!("Papers saved: {}", collected.saved);
    for tier in [Relevance::High, Relevance::Medium, Relevance::Low] {
        let count = collected.tiers.get(&tier).copied().unwrap_or(0);
        println!("  {:<6} {}", tier.as_str(), count);
    }
    if !collected.failed_keywords.is_empty() {
        println!("Failed keywords: {}", collected.failed_keywords.join(", "));
    }
    println!("Duration: {:.2}s", collected.duration.as_secs_f64());
    Ok(())
}
