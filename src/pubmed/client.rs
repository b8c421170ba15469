use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::parse::parse_search_ids;
use super::query::QueryBuilder;
use super::types::Pmid;
use crate::config::{ApiConfig, Config, DATE_FORMAT};
use crate::error::TransportError;

/// One GET against the search API, returning the response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, params: &[(&'static str, String)]) -> Result<String, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/xml,application/json,text/xml,text/plain"),
        );
        let client = reqwest::Client::builder()
            .timeout(api.timeout)
            .user_agent(format!("{}/1.0 ({})", api.tool_name, api.contact_email))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str, params: &[(&'static str, String)]) -> Result<String, TransportError> {
        let request_error = |source| TransportError::Request {
            url: url.to_string(),
            source,
        };
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(request_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(request_error)
    }
}

/// Enforces a minimum gap between consecutive outbound requests.
pub struct Pacer {
    min_gap: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.min_gap).await;
        }
        *last = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait after the 0-based `attempt` fails.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds or the attempt budget is spent; the last
    /// error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 >= attempts => return Err(e),
                Err(e) => {
                    let wait = self.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Request failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Two-phase PubMed retrieval: ESearch for ids, then batched EFetch.
pub struct SearchClient {
    transport: Arc<dyn Transport>,
    pacer: Pacer,
    retry: RetryPolicy,
    query: QueryBuilder,
    base_url: String,
    api_key: Option<String>,
    contact_email: String,
    tool_name: String,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    batch_size: usize,
}

impl SearchClient {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let api = &config.api;
        info!(
            api_key = api.api_key.is_some(),
            base_url = %api.base_url,
            "PubMed search client initialized"
        );
        Self {
            transport,
            pacer: Pacer::new(api.request_delay),
            retry: RetryPolicy {
                max_attempts: api.max_retries,
                base_delay: api.retry_base_delay,
            },
            query: QueryBuilder::new(&config.filter),
            base_url: api.base_url.clone(),
            api_key: api.api_key.clone(),
            contact_email: api.contact_email.clone(),
            tool_name: api.tool_name.clone(),
            date_from: config.filter.date_from,
            date_to: config.filter.date_to,
            batch_size: api.batch_size.max(1),
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name)
    }

    fn identity_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("tool", self.tool_name.clone()),
            ("email", self.contact_email.clone()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn request(&self, url: &str, params: &[(&'static str, String)]) -> Result<String, TransportError> {
        self.retry
            .run(|attempt| async move {
                self.pacer.wait().await;
                debug!(url, attempt = attempt + 1, "PubMed request");
                self.transport.get(url, params).await
            })
            .await
    }

    /// ESearch: up to `max_results` ids for `keyword`, relevance-sorted.
    /// A body that cannot be parsed yields no ids.
    pub async fn search_ids(&self, keyword: &str, max_results: usize) -> Result<Vec<Pmid>, TransportError> {
        let term = self.query.build(keyword, Local::now().date_naive());
        debug!(keyword, term = %term, "Search query built");

        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", term),
            ("retmax", max_results.to_string()),
            ("retmode", "xml".to_string()),
            ("sort", "relevance".to_string()),
        ];
        params.extend(self.identity_params());
        if let Some(from) = self.date_from {
            params.push(("datetype", "pdat".to_string()));
            params.push(("mindate", from.format(DATE_FORMAT).to_string()));
            if let Some(to) = self.date_to {
                params.push(("maxdate", to.format(DATE_FORMAT).to_string()));
            }
        }

        let body = self.request(&self.endpoint("esearch.fcgi"), &params).await?;
        match parse_search_ids(&body) {
            Ok(ids) => {
                debug!(keyword, count = ids.len(), "ESearch ids parsed");
                Ok(ids)
            }
            Err(e) => {
                error!(keyword, "ESearch response parsing error: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// EFetch in batches of `batch_size`; bodies are returned in batch order.
    pub async fn fetch_details(&self, ids: &[Pmid]) -> Result<Vec<String>, TransportError> {
        let url = self.endpoint("efetch.fcgi");
        let mut bodies = Vec::with_capacity(ids.len().div_ceil(self.batch_size));

        for (batch, chunk) in ids.chunks(self.batch_size).enumerate() {
            let mut params = vec![
                ("db", "pubmed".to_string()),
                ("id", chunk.join(",")),
                ("retmode", "xml".to_string()),
                ("rettype", "abstract".to_string()),
            ];
            params.extend(self.identity_params());

            let body = self.request(&url, &params).await?;
            debug!(batch = batch + 1, ids = chunk.len(), bytes = body.len(), "EFetch batch received");
            bodies.push(body);
        }

        Ok(bodies)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Replays canned responses and records every request it sees.
    pub(crate) struct FakeTransport {
        responses: StdMutex<VecDeque<Result<String, TransportError>>>,
        pub(crate) calls: StdMutex<Vec<(String, Vec<(&'static str, String)>)>>,
    }

    impl FakeTransport {
        pub(crate) fn new(responses: Vec<Result<String, TransportError>>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                calls: StdMutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn param(&self, call: usize, key: &str) -> Option<String> {
            let calls = self.calls.lock().unwrap();
            calls[call].1.iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone())
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, url: &str, params: &[(&'static str, String)]) -> Result<String, TransportError> {
            self.calls.lock().unwrap().push((url.to_string(), params.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(unavailable(url)))
        }
    }

    pub(crate) fn unavailable(url: &str) -> TransportError {
        TransportError::Status {
            url: url.to_string(),
            status: 503,
        }
    }

    pub(crate) fn esearch_body(ids: &[&str]) -> String {
        let ids: String = ids.iter().map(|id| format!("<Id>{}</Id>", id)).collect();
        format!(
            "<?xml version=\"1.0\"?><eSearchResult><Count>{}</Count><IdList>{}</IdList></eSearchResult>",
            ids.len(),
            ids
        )
    }

    pub(crate) fn test_config() -> Config {
        let mut config = Config::default();
        config.api.contact_email = "lab@example.org".to_string();
        config.api.request_delay = Duration::from_millis(100);
        config.api.retry_base_delay = Duration::from_secs(1);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        let mut seen = Vec::new();
        let start = Instant::now();
        let result: Result<&str, String> = policy
            .run(|attempt| {
                seen.push((attempt, start.elapsed()));
                async move {
                    if attempt < 2 {
                        Err(format!("boom {}", attempt))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(seen.len(), 3);
        // base x1 after the first failure, base x2 after the second
        assert_eq!(seen[1].1 - seen[0].1, Duration::from_secs(2));
        assert_eq!(seen[2].1 - seen[1].1, Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        };
        let mut calls = 0;
        let result: Result<(), String> = policy
            .run(|attempt| {
                calls += 1;
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;
        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_requests() {
        let pacer = Pacer::new(Duration::from_millis(300));
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(300));
        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = Instant::now();
        pacer.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_ids_params() {
        let mut config = test_config();
        config.api.api_key = Some("secret".to_string());
        config.filter.date_from = NaiveDate::from_ymd_opt(2021, 1, 1);
        let transport = Arc::new(FakeTransport::new(vec![Ok(esearch_body(&["11", "22"]))]));
        let client = SearchClient::new(&config, transport.clone());

        let ids = client.search_ids("breast cancer", 25).await.unwrap();
        assert_eq!(ids, vec!["11", "22"]);

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].0, "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi");
        drop(calls);
        assert_eq!(transport.param(0, "retmax").as_deref(), Some("25"));
        assert_eq!(transport.param(0, "sort").as_deref(), Some("relevance"));
        assert_eq!(transport.param(0, "api_key").as_deref(), Some("secret"));
        assert_eq!(transport.param(0, "email").as_deref(), Some("lab@example.org"));
        assert_eq!(transport.param(0, "mindate").as_deref(), Some("2021/01/01"));
        assert_eq!(transport.param(0, "maxdate"), None);
        assert!(transport
            .param(0, "term")
            .unwrap()
            .starts_with("breast cancer[All Fields] AND (\"2021/01/01\"[Publication Date]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_ids_retries_then_succeeds() {
        let config = test_config();
        let url = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
        let transport = Arc::new(FakeTransport::new(vec![
            Err(unavailable(url)),
            Err(unavailable(url)),
            Ok(esearch_body(&["7"])),
        ]));
        let client = SearchClient::new(&config, transport.clone());
        let start = Instant::now();

        let ids = client.search_ids("x", 10).await.unwrap();
        assert_eq!(ids, vec!["7"]);
        assert_eq!(transport.call_count(), 3);
        // 1s + 2s of backoff; both exceed the pacing gap
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_ids_exhaustion_surfaces_error() {
        let config = test_config();
        let transport = Arc::new(FakeTransport::new(vec![]));
        let client = SearchClient::new(&config, transport.clone());
        let err = client.search_ids("x", 10).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_esearch_yields_no_ids() {
        let config = test_config();
        let transport = Arc::new(FakeTransport::new(vec![Ok("<eSearchResult><IdList>".to_string())]));
        let client = SearchClient::new(&config, transport);
        assert!(client.search_ids("x", 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_details_batches_in_order() {
        let mut config = test_config();
        config.api.batch_size = 2;
        let transport = Arc::new(FakeTransport::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
            Ok("third".to_string()),
        ]));
        let client = SearchClient::new(&config, transport.clone());
        let ids: Vec<Pmid> = ["1", "2", "3", "4", "5"].iter().map(|s| s.to_string()).collect();

        let bodies = client.fetch_details(&ids).await.unwrap();
        assert_eq!(bodies, vec!["first", "second", "third"]);
        assert_eq!(transport.param(0, "id").as_deref(), Some("1,2"));
        assert_eq!(transport.param(1, "id").as_deref(), Some("3,4"));
        assert_eq!(transport.param(2, "id").as_deref(), Some("5"));
        assert_eq!(transport.param(0, "rettype").as_deref(), Some("abstract"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_batch_size_is_200() {
        let config = test_config();
        let transport = Arc::new(FakeTransport::new(vec![Ok("a".to_string()), Ok("b".to_string())]));
        let client = SearchClient::new(&config, transport.clone());
        let ids: Vec<Pmid> = (0..201).map(|i| i.to_string()).collect();
        client.fetch_details(&ids).await.unwrap();
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.param(1, "id").as_deref(), Some("200"));
    }
}
