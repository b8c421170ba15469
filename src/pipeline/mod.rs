pub mod dedup;
pub mod filter;
pub mod score;
pub mod summary;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::pubmed::client::{SearchClient, Transport};
use crate::pubmed::parse::{Extracted, ResponseParser};
use crate::pubmed::types::Paper;
use dedup::Deduplicator;
use filter::{DateFilter, Rejection, RequiredKeywordFilter, Verdict};
use score::{Categorizer, RelevanceScorer};
use summary::{Summarizer, TemplateSummarizer};

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Completed papers, highest score first.
    pub papers: Vec<Paper>,
    /// Keywords whose search or fetch failed after retries.
    pub failed_keywords: Vec<String>,
    /// Unique papers after merging all keywords, before filtering.
    pub unique_found: usize,
    /// Excluded papers per [`Rejection::kind`].
    pub rejections: BTreeMap<&'static str, usize>,
}

impl RunReport {
    fn reject(&mut self, reason: &Rejection) {
        *self.rejections.entry(reason.kind()).or_default() += 1;
    }

    pub fn rejected_total(&self) -> usize {
        self.rejections.values().sum()
    }
}

/// fetch → parse → dedup → filter → score → categorize → summarize.
pub struct Pipeline {
    client: SearchClient,
    parser: ResponseParser,
    date_filter: DateFilter,
    required_filter: RequiredKeywordFilter,
    scorer: RelevanceScorer,
    categorizer: Categorizer,
    summarizer: Box<dyn Summarizer>,
    min_score: f64,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>) -> Self {
        let date_filter = DateFilter::new(&config);
        if !date_filter.is_active() {
            info!("No lower date bound configured, date filter disabled");
        }
        Self {
            client: SearchClient::new(&config, transport),
            parser: ResponseParser::new(&config),
            date_filter,
            required_filter: RequiredKeywordFilter::new(&config),
            scorer: RelevanceScorer::new(&config),
            categorizer: Categorizer::new(&config),
            summarizer: Box::new(TemplateSummarizer::new(&config)),
            min_score: config.scoring.min_score,
        }
    }

    /// Swap the summary strategy.
    #[cfg(test)]
    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    async fn collect_keyword(&self, keyword: &str, max_results: usize, report: &mut RunReport) -> Result<Vec<Paper>, TransportError> {
        let ids = self.client.search_ids(keyword, max_results).await?;
        if ids.is_empty() {
            info!(keyword, "No papers found");
            return Ok(Vec::new());
        }
        debug!(keyword, ids = ids.len(), "Fetching paper details");

        let bodies = self.client.fetch_details(&ids).await?;
        let mut papers = Vec::new();
        for body in &bodies {
            for extracted in self.parser.parse_detailed(body, keyword) {
                match extracted {
                    Extracted::Paper(paper) => papers.push(*paper),
                    Extracted::Dropped { reason, .. } => report.reject(&reason),
                }
            }
        }
        Ok(papers)
    }

    fn admit(&self, paper: &Paper) -> Verdict {
        let verdict = self.date_filter.check(paper);
        if !verdict.is_accept() {
            return verdict;
        }
        self.required_filter.check(paper)
    }

    /// Run every keyword in order. A keyword whose requests fail is logged,
    /// recorded in the report and skipped; the run continues.
    pub async fn run(&self, keywords: &[String], max_results: usize) -> RunReport {
        let mut report = RunReport::default();
        let mut dedup = Deduplicator::new();

        for keyword in keywords {
            info!(keyword = %keyword, "Starting search");
            match self.collect_keyword(keyword, max_results, &mut report).await {
                Ok(papers) => {
                    let found = papers.len();
                    let added = dedup.extend(papers);
                    info!(keyword = %keyword, found, new = added, "Keyword search finished");
                }
                Err(e) => {
                    error!(keyword = %keyword, "Error searching keyword: {}", e);
                    report.failed_keywords.push(keyword.clone());
                }
            }
        }

        report.unique_found = dedup.len();
        if dedup.is_empty() {
            warn!(keywords = keywords.len(), "No papers collected from any keyword");
        } else {
            info!(unique = report.unique_found, "Unique papers found");
        }

        for mut paper in dedup.into_papers() {
            if let Verdict::Reject(reason) = self.admit(&paper) {
                debug!(pmid = %paper.pmid, %reason, "Paper excluded");
                report.reject(&reason);
                continue;
            }

            paper.score = self.scorer.score(&paper);
            paper.relevance = self.categorizer.categorize(paper.score, &paper.journal);
            paper.summary = self.summarizer.summarize(&paper);

            if paper.score < self.min_score {
                let reason = Rejection::BelowScoreThreshold {
                    score: paper.score,
                    minimum: self.min_score,
                };
                debug!(pmid = %paper.pmid, %reason, "Paper excluded");
                report.reject(&reason);
                continue;
            }
            report.papers.push(paper);
        }

        // Stable: equal scores keep discovery order.
        report
            .papers
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        info!(
            accepted = report.papers.len(),
            rejected = report.rejected_total(),
            failed_keywords = report.failed_keywords.len(),
            "Pipeline run complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubmed::client::tests::{esearch_body, test_config, unavailable, FakeTransport};
    use crate::pubmed::parse::tests::{article_set, article_xml};
    use crate::pubmed::types::Relevance;

    const LONG_ABSTRACT: &str =
        "Whole genome sequencing of breast cancer reveals clonal evolution and mutation patterns.";

    fn pipeline(config: Config, transport: Arc<FakeTransport>) -> Pipeline {
        Pipeline::new(Arc::new(config), transport)
    }

    fn keywords(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_abstract_dropped_end_to_end() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["101", "102"])),
            Ok(article_set(&[
                article_xml("101", "Breast cancer evolution", LONG_ABSTRACT),
                article_xml("102", "Tiny note", "Too short."),
            ])),
        ]));
        let report = pipeline(config, transport.clone()).run(&keywords(&["x"]), 10).await;

        assert_eq!(report.papers.len(), 1);
        let paper = &report.papers[0];
        assert_eq!(paper.pmid, "101");
        assert_eq!(paper.search_keyword, "x");
        // "Nature Genetics" matches the "nature" high-impact entry.
        assert_eq!(paper.relevance, Relevance::High);
        assert!(paper.summary.starts_with("This study is about Breast Cancer"));
        assert_eq!(report.rejections.get("abstract_too_short"), Some(&1));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.param(1, "id").as_deref(), Some("101,102"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_across_keywords_kept_once() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["1", "2"])),
            Ok(article_set(&[
                article_xml("1", "Cancer sequencing", LONG_ABSTRACT),
                article_xml("2", "Cancer mutation", LONG_ABSTRACT),
            ])),
            Ok(esearch_body(&["2", "3"])),
            Ok(article_set(&[
                article_xml("2", "Cancer mutation", LONG_ABSTRACT),
                article_xml("3", "Cancer evolution", LONG_ABSTRACT),
            ])),
        ]));
        let report = pipeline(config, transport)
            .run(&keywords(&["alpha", "beta"]), 10)
            .await;

        assert_eq!(report.unique_found, 3);
        let mut ids: Vec<&str> = report.papers.iter().map(|p| p.pmid.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
        let two = report.papers.iter().find(|p| p.pmid == "2").unwrap();
        assert_eq!(two.search_keyword, "alpha");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_keyword_does_not_stop_run() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        let url = format!("{}esearch.fcgi", config.api.base_url);
        let transport = Arc::new(FakeTransport::new(vec![
            Err(unavailable(&url)),
            Err(unavailable(&url)),
            Err(unavailable(&url)),
            Ok(esearch_body(&["7"])),
            Ok(article_set(&[article_xml("7", "Cancer sequencing", LONG_ABSTRACT)])),
        ]));
        let report = pipeline(config, transport)
            .run(&keywords(&["broken", "working"]), 10)
            .await;

        assert_eq!(report.failed_keywords, vec!["broken"]);
        assert_eq!(report.papers.len(), 1);
        assert_eq!(report.papers[0].search_keyword, "working");
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_and_min_score_applied_in_order() {
        let mut config = test_config();
        config.scoring.required_keywords = vec!["sequencing".to_string()];
        config.scoring.min_score = 0.5;
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["1", "2", "3"])),
            Ok(article_set(&[
                article_xml("1", "Breast cancer sequencing", LONG_ABSTRACT),
                article_xml("2", "Protein folding", "Folding kinetics were measured by fluorescence spectroscopy in vitro."),
                article_xml(
                    "3",
                    "Rna sequencing protocol",
                    "A protocol for rna sequencing of plant tissues with low input.",
                ),
            ])),
        ]));
        let report = pipeline(config, transport).run(&keywords(&["cancer"]), 10).await;

        let ids: Vec<&str> = report.papers.iter().map(|p| p.pmid.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        assert_eq!(report.rejections.get("missing_required_term"), Some(&1));
        assert_eq!(report.rejections.get("below_score_threshold"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sorted_by_score_descending() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        config.scoring.high_impact_journals.clear();
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["1", "2"])),
            Ok(article_set(&[
                article_xml("1", "Plain title here", "Nothing specific is discussed in this rather long abstract."),
                article_xml("2", "Clonal evolution of cancer", LONG_ABSTRACT),
            ])),
        ]));
        let report = pipeline(config, transport).run(&keywords(&["cancer"]), 10).await;

        let ids: Vec<&str> = report.papers.iter().map(|p| p.pmid.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(report.papers[0].score > report.papers[1].score);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_exhaustion_fails_keyword() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        let efetch = format!("{}efetch.fcgi", config.api.base_url);
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["1"])),
            Err(unavailable(&efetch)),
            Err(unavailable(&efetch)),
            Err(unavailable(&efetch)),
            Ok(esearch_body(&["9"])),
            Ok(article_set(&[article_xml("9", "Cancer sequencing", LONG_ABSTRACT)])),
        ]));
        let report = pipeline(config, transport.clone())
            .run(&keywords(&["a", "b"]), 10)
            .await;

        assert_eq!(report.failed_keywords, vec!["a"]);
        let ids: Vec<&str> = report.papers.iter().map(|p| p.pmid.as_str()).collect();
        assert_eq!(ids, vec!["9"]);
        assert_eq!(transport.call_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_second_batch_discards_keyword() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        config.api.batch_size = 1;
        let efetch = format!("{}efetch.fcgi", config.api.base_url);
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["1", "2"])),
            Ok(article_set(&[article_xml("1", "Cancer atlas", LONG_ABSTRACT)])),
            Err(unavailable(&efetch)),
            Err(unavailable(&efetch)),
            Err(unavailable(&efetch)),
            Ok(esearch_body(&["9"])),
            Ok(article_set(&[article_xml("9", "Cancer sequencing", LONG_ABSTRACT)])),
        ]));
        let report = pipeline(config, transport.clone())
            .run(&keywords(&["a", "b"]), 10)
            .await;

        assert_eq!(transport.param(1, "id").as_deref(), Some("1"));
        assert_eq!(transport.param(2, "id").as_deref(), Some("2"));
        assert_eq!(report.failed_keywords, vec!["a"]);
        assert_eq!(report.unique_found, 1);
        let ids: Vec<&str> = report.papers.iter().map(|p| p.pmid.as_str()).collect();
        assert_eq!(ids, vec!["9"]);
    }

    struct TitleOnly;

    impl Summarizer for TitleOnly {
        fn summarize(&self, paper: &Paper) -> String {
            paper.title.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_summarizer() {
        let mut config = test_config();
        config.scoring.required_keywords.clear();
        let transport = Arc::new(FakeTransport::new(vec![
            Ok(esearch_body(&["5"])),
            Ok(article_set(&[article_xml("5", "Cancer atlas", LONG_ABSTRACT)])),
        ]));
        let report = pipeline(config, transport)
            .with_summarizer(Box::new(TitleOnly))
            .run(&keywords(&["atlas"]), 10)
            .await;
        assert_eq!(report.papers[0].summary, "Cancer atlas");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ids_skips_fetch() {
        let transport = Arc::new(FakeTransport::new(vec![Ok(esearch_body(&[]))]));
        let report = pipeline(test_config(), transport.clone())
            .run(&keywords(&["nothing"]), 10)
            .await;
        assert!(report.papers.is_empty());
        assert!(report.failed_keywords.is_empty());
        assert_eq!(transport.call_count(), 1);
    }
}
