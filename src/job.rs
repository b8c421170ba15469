use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::pubmed::types::Relevance;
use crate::scheduler::Job;
use crate::store::RecordSink;

/// What one collection run produced.
#[derive(Debug, Default)]
pub struct Collected {
    pub found: usize,
    pub saved: usize,
    pub failed_keywords: Vec<String>,
    pub tiers: BTreeMap<Relevance, usize>,
    pub duration: Duration,
}

/// Pipeline over a keyword list, then every paper handed to the sink.
pub struct CollectionJob {
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn RecordSink>,
    keywords: Vec<String>,
    max_results: usize,
    last: Mutex<Option<Collected>>,
}

impl CollectionJob {
    pub fn new(pipeline: Arc<Pipeline>, sink: Arc<dyn RecordSink>, keywords: Vec<String>, max_results: usize) -> Self {
        Self {
            pipeline,
            sink,
            keywords,
            max_results,
            last: Mutex::new(None),
        }
    }

    /// Outcome of the most recent scheduled or one-off run, if any.
    pub async fn take_last(&self) -> Option<Collected> {
        self.last.lock().await.take()
    }

    pub async fn collect(&self) -> Collected {
        let started = Instant::now();
        info!(keywords = ?self.keywords, max_results = self.max_results, "Searching papers");
        let report = self.pipeline.run(&self.keywords, self.max_results).await;

        let mut collected = Collected {
            found: report.papers.len(),
            failed_keywords: report.failed_keywords,
            ..Default::default()
        };
        if report.papers.is_empty() {
            warn!("No papers found");
        }

        for paper in &report.papers {
            *collected.tiers.entry(paper.relevance).or_default() += 1;
            match self.sink.save(paper).await {
                Ok(_) => collected.saved += 1,
                Err(e) => error!(pmid = %paper.pmid, "Error saving paper: {:#}", e),
            }
        }

        collected.duration = started.elapsed();
        let tier = |r: Relevance| collected.tiers.get(&r).copied().unwrap_or(0);
        info!(
            found = collected.found,
            saved = collected.saved,
            high = tier(Relevance::High),
            medium = tier(Relevance::Medium),
            low = tier(Relevance::Low),
            failed_keywords = collected.failed_keywords.len(),
            duration = ?collected.duration,
            "Paper collection job completed"
        );
        collected
    }
}

#[async_trait]
impl Job for CollectionJob {
    async fn run(&self) {
        let collected = self.collect().await;
        *self.last.lock().await = Some(collected);
    }
}
