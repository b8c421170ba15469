use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::scheduler::{build_triggers, ScheduleStatus};
use crate::state::AppState;
use crate::store::{RecordSink, StoreSummary};

#[derive(Serialize)]
struct StatusReport {
    schedule: ScheduleStatus,
    output: StoreSummary,
}

pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let config = &state.config;
    let mut schedule = state
        .engine(Arc::new(state.job(Vec::new(), None)))
        .status()
        .await;
    if schedule.enabled {
        // Not started in this process; preview what start would register.
        schedule.next_run = schedule.next_run.or_else(|| {
            build_triggers(&schedule.days, config.schedule.time, Local::now().naive_local())
                .into_iter()
                .map(|t| t.next_run)
                .min()
        });
    }
    let output = state.store.summary().await;

    if json {
        let report = StatusReport { schedule, output };
        let text = serde_json::to_string_pretty(&report).context("Failed to encode status")?;
        println!("{}", text);
        return Ok(());
    }

    println!("Schedule");
    println!("  enabled:     {}", schedule.enabled);
    println!("  time:        {}", schedule.time);
    println!("  days:        {}", schedule.days.join(", "));
    if schedule.enabled {
        match schedule.next_run {
            Some(at) => println!("  next run:    {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => println!("  next run:    none (no valid days)"),
        }
    }

    println!("Search");
    println!("  keywords:    {}", schedule.keywords.join(", "));
    println!("  max results: {}", schedule.max_results);
    match config.filter.date_from {
        Some(from) => {
            let to = config
                .filter
                .date_to
                .map(|d| d.to_string())
                .unwrap_or_else(|| "today".to_string());
            println!("  date window: {} .. {}", from, to);
        }
        None => println!("  date window: off"),
    }

    println!("Output");
    println!("  directory:   {}", output.output_dir.display());
    println!("  files:       {}", output.total_files);
    Ok(())
}
