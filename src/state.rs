use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::job::CollectionJob;
use crate::pipeline::Pipeline;
use crate::pubmed::client::{HttpTransport, Transport};
use crate::scheduler::{Job, ScheduleEngine};
use crate::store::MarkdownStore;

/// Shared handles built once at startup.
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<MarkdownStore>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.api)?);
        let pipeline = Arc::new(Pipeline::new(config.clone(), transport));
        let store = Arc::new(MarkdownStore::new(&config.output)?);
        Ok(Self {
            config,
            pipeline,
            store,
        })
    }

    /// Collection job over `keywords`, falling back to the configured ones.
    pub fn job(&self, keywords: Vec<String>, max_results: Option<usize>) -> CollectionJob {
        let keywords = if keywords.is_empty() {
            self.config.search.keywords.clone()
        } else {
            keywords
        };
        CollectionJob::new(
            self.pipeline.clone(),
            self.store.clone(),
            keywords,
            max_results.unwrap_or(self.config.search.max_results),
        )
    }

    pub fn engine(&self, job: Arc<dyn Job>) -> ScheduleEngine {
        ScheduleEngine::new(self.config.clone(), job)
    }
}
