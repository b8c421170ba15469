use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Days, Local, NaiveDateTime, NaiveTime, Weekday};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Work fired by a trigger. Runs to completion inside the poll loop.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self);
}

/// Source of local wall-clock time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// Full lowercase weekday names only; "mon" or "funday" are not weekdays here.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// First `weekday` at `time` strictly after `now`.
pub fn next_occurrence(weekday: Weekday, time: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date();
    let ahead = (7 + weekday.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
    let candidate = (today + Days::new(ahead as u64)).and_time(time);
    if candidate > now {
        candidate
    } else {
        (today + Days::new(ahead as u64 + 7)).and_time(time)
    }
}

/// Weekly trigger at a fixed weekday and time of day.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub next_run: NaiveDateTime,
}

impl Trigger {
    fn new(weekday: Weekday, time: NaiveTime, now: NaiveDateTime) -> Self {
        Self {
            weekday,
            time,
            next_run: next_occurrence(weekday, time, now),
        }
    }

    fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_run
    }

    fn advance(&mut self, now: NaiveDateTime) {
        self.next_run = next_occurrence(self.weekday, self.time, now);
    }
}

/// One trigger per recognized day name; unknown and repeated names are
/// skipped with a warning.
pub fn build_triggers(days: &[String], time: NaiveTime, now: NaiveDateTime) -> Vec<Trigger> {
    let mut triggers: Vec<Trigger> = Vec::new();
    for day in days {
        let Some(weekday) = parse_weekday(day) else {
            warn!(day = %day, "Unknown day, skipped");
            continue;
        };
        if triggers.iter().any(|t| t.weekday == weekday) {
            warn!(day = %day, "Day listed twice, skipped");
            continue;
        }
        triggers.push(Trigger::new(weekday, time, now));
    }
    triggers
}

/// Snapshot for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub time: String,
    pub days: Vec<String>,
    pub keywords: Vec<String>,
    pub max_results: usize,
    pub running: bool,
    pub next_run: Option<NaiveDateTime>,
    pub trigger_count: usize,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Re-runs a [`Job`] on weekly triggers from a single background task.
///
/// Stopped until [`start`](Self::start); [`stop`](Self::stop) cancels the
/// loop and waits up to `stop_timeout` for it to finish. Job executions
/// never overlap: the loop and [`run_once`](Self::run_once) share a gate.
pub struct ScheduleEngine {
    config: Arc<Config>,
    job: Arc<dyn Job>,
    clock: Clock,
    triggers: Arc<Mutex<Vec<Trigger>>>,
    gate: Arc<Mutex<()>>,
    worker: Mutex<Option<Worker>>,
}

impl ScheduleEngine {
    pub fn new(config: Arc<Config>, job: Arc<dyn Job>) -> Self {
        Self {
            config,
            job,
            clock: system_clock(),
            triggers: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Mutex::new(())),
            worker: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    /// Register triggers and spawn the poll loop. No-op when disabled or
    /// already running.
    pub async fn start(&self) {
        let schedule = &self.config.schedule;
        if !schedule.enabled {
            info!("Scheduling is disabled");
            return;
        }
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            warn!("Scheduler is already running");
            return;
        }

        let registered = build_triggers(&schedule.days, schedule.time, (self.clock)());
        info!(
            days = %schedule.days.join(", "),
            time = %schedule.time.format("%H:%M"),
            triggers = registered.len(),
            "Schedule setup complete"
        );
        *self.triggers.lock().await = registered;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.triggers.clone(),
            self.job.clone(),
            self.gate.clone(),
            self.clock.clone(),
            schedule.poll_interval,
            cancel.clone(),
        ));
        *worker = Some(Worker { cancel, handle });
        info!("Scheduler started");
    }

    /// Cancel the poll loop and wait for it, bounded by the stop timeout.
    /// A job still running past the timeout is left to finish on its own.
    pub async fn stop(&self) {
        let Some(worker) = self.worker.lock().await.take() else {
            info!("Scheduler is not running");
            return;
        };
        worker.cancel.cancel();
        self.triggers.lock().await.clear();

        let timeout = self.config.schedule.stop_timeout;
        match tokio::time::timeout(timeout, worker.handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => warn!("Scheduler task ended abnormally: {}", e),
            Err(_) => warn!(timeout = ?timeout, "Scheduler did not stop in time; detaching"),
        }
    }

    /// Run the job now, outside the schedule.
    pub async fn run_once(&self) {
        info!("One-time collection run");
        let _guard = self.gate.lock().await;
        self.job.run().await;
    }

    /// Earliest pending trigger, if the schedule is running.
    pub async fn next_run(&self) -> Option<NaiveDateTime> {
        if !self.config.schedule.enabled {
            return None;
        }
        self.triggers.lock().await.iter().map(|t| t.next_run).min()
    }

    pub async fn status(&self) -> ScheduleStatus {
        let config = &self.config;
        ScheduleStatus {
            enabled: config.schedule.enabled,
            time: config.schedule.time.format("%H:%M").to_string(),
            days: config.schedule.days.clone(),
            keywords: config.search.keywords.clone(),
            max_results: config.search.max_results,
            running: self.is_running().await,
            next_run: self.next_run().await,
            trigger_count: self.triggers.lock().await.len(),
        }
    }
}

async fn poll_loop(
    triggers: Arc<Mutex<Vec<Trigger>>>,
    job: Arc<dyn Job>,
    gate: Arc<Mutex<()>>,
    clock: Clock,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let now = clock();
        let due = {
            let mut triggers = triggers.lock().await;
            let mut due = 0;
            for trigger in triggers.iter_mut().filter(|t| t.is_due(now)) {
                debug!(weekday = %trigger.weekday, at = %trigger.next_run, "Trigger due");
                trigger.advance(now);
                due += 1;
            }
            due
        };

        for _ in 0..due {
            info!("Scheduled collection job started");
            let _guard = gate.lock().await;
            job.run().await;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
    debug!("Scheduler loop exited");
}
