use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Days, Local, NaiveDate, NaiveTime};
use tracing::warn;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/";

const DEFAULT_SEARCH_KEYWORDS: &[&str] = &[
    "breast cancer",
    "cancer genomics",
    "sequencing",
    "mutation",
    "cancer evolution",
    "cancer",
    "evolution",
    "trajectory",
    "tumor",
    "somatic",
    "germline",
];

const DEFAULT_REQUIRED_KEYWORDS: &[&str] = &["breast cancer", "cancer", "sequencing", "mutation"];

const DEFAULT_PRIORITY_KEYWORDS: &[&str] = &[
    "cancer evolution",
    "evolution",
    "clonal",
    "whole genome duplication",
    "whole genome doubling",
    "giant tumor cell",
    "WGD",
    "WGS",
    "SNV",
    "SV",
    "CNV",
    "CNA",
    "copy number alteration",
    "copynumber alteration",
    "structural",
];

const DEFAULT_HIGH_IMPACT_JOURNALS: &[&str] = &["nature", "cell", "science"];

/// Date bounds use the search API's `YYYY/MM/DD` notation.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Remote API identity, pacing and retry behaviour.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub contact_email: String,
    pub tool_name: String,
    /// Minimum gap between any two outbound requests.
    pub request_delay: Duration,
    pub max_retries: u32,
    /// Attempt `n` (0-based) that fails waits `retry_base_delay * 2^n`.
    pub retry_base_delay: Duration,
    pub timeout: Duration,
    /// Identifiers per detail-fetch request.
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub keywords: Vec<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
}

#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub required_keywords: Vec<String>,
    pub priority_keywords: Vec<String>,
    pub required_weight: f64,
    pub priority_weight: f64,
    pub thresholds: Thresholds,
    pub high_impact_journals: Vec<String>,
    /// Papers scoring below this are dropped after scoring.
    pub min_score: f64,
}

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_abstract_length: usize,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub max_length: usize,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub time: NaiveTime,
    /// Raw weekday names; unknown names are rejected one by one at registration.
    pub days: Vec<String>,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub date_folders: bool,
}

/// Immutable process configuration. Built once, shared as `Arc<Config>`.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub search: SearchConfig,
    pub scoring: ScoringConfig,
    pub filter: FilterConfig,
    pub summary: SummaryConfig,
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    /// Defaults for every option. `contact_email` is left empty and must be
    /// supplied before the API is used.
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                api_key: None,
                contact_email: String::new(),
                tool_name: "PaperSurfer".to_string(),
                request_delay: Duration::from_secs(1),
                max_retries: 3,
                retry_base_delay: Duration::from_secs(1),
                timeout: Duration::from_secs(30),
                batch_size: 200,
            },
            search: SearchConfig {
                keywords: strings(DEFAULT_SEARCH_KEYWORDS),
                max_results: 50,
            },
            scoring: ScoringConfig {
                required_keywords: strings(DEFAULT_REQUIRED_KEYWORDS),
                priority_keywords: strings(DEFAULT_PRIORITY_KEYWORDS),
                required_weight: 1.0,
                priority_weight: 2.0,
                thresholds: Thresholds {
                    high: 0.7,
                    medium: 0.4,
                },
                high_impact_journals: strings(DEFAULT_HIGH_IMPACT_JOURNALS),
                min_score: 0.0,
            },
            filter: FilterConfig {
                date_from: None,
                date_to: None,
                min_abstract_length: 50,
                languages: vec!["english".to_string()],
            },
            summary: SummaryConfig {
                enabled: true,
                max_length: 150,
            },
            schedule: ScheduleConfig {
                enabled: true,
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
                days: vec!["sunday".to_string()],
                poll_interval: Duration::from_secs(60),
                stop_timeout: Duration::from_secs(5),
            },
            output: OutputConfig {
                dir: PathBuf::from("./output/papers"),
                date_folders: true,
            },
        }
    }
}

impl Config {
    /// Load from the environment (and `.env`), falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        let api = &mut config.api;
        if let Some(url) = get("PUBMED_BASE_URL") {
            api.base_url = url;
        }
        api.api_key = get("PUBMED_API_KEY");
        api.contact_email = get("PUBMED_CONTACT_EMAIL").ok_or(ConfigError::Missing("PUBMED_CONTACT_EMAIL"))?;
        if let Some(tool) = get("PUBMED_TOOL_NAME") {
            api.tool_name = tool;
        }
        set_secs(&get, "PUBMED_REQUEST_DELAY", &mut api.request_delay)?;
        set_parsed(&get, "PUBMED_MAX_RETRIES", &mut api.max_retries)?;
        set_secs(&get, "PUBMED_RETRY_BASE_DELAY", &mut api.retry_base_delay)?;
        set_secs(&get, "PUBMED_REQUEST_TIMEOUT", &mut api.timeout)?;
        set_parsed(&get, "PUBMED_FETCH_BATCH_SIZE", &mut api.batch_size)?;
        if api.max_retries == 0 {
            return Err(invalid("PUBMED_MAX_RETRIES", "0"));
        }
        if api.batch_size == 0 {
            return Err(invalid("PUBMED_FETCH_BATCH_SIZE", "0"));
        }

        let search = &mut config.search;
        set_list(&get, "SEARCH_KEYWORDS", &mut search.keywords);
        set_parsed(&get, "MAX_RESULTS_PER_SEARCH", &mut search.max_results)?;
        if search.keywords.is_empty() {
            return Err(ConfigError::Missing("SEARCH_KEYWORDS"));
        }

        let scoring = &mut config.scoring;
        set_list(&get, "REQUIRED_KEYWORDS", &mut scoring.required_keywords);
        set_list(&get, "PRIORITY_KEYWORDS", &mut scoring.priority_keywords);
        set_parsed(&get, "REQUIRED_KEYWORD_WEIGHT", &mut scoring.required_weight)?;
        set_parsed(&get, "PRIORITY_KEYWORD_WEIGHT", &mut scoring.priority_weight)?;
        set_parsed(&get, "SCORE_THRESHOLD_HIGH", &mut scoring.thresholds.high)?;
        set_parsed(&get, "SCORE_THRESHOLD_MEDIUM", &mut scoring.thresholds.medium)?;
        set_parsed(&get, "KEYWORD_MATCH_THRESHOLD", &mut scoring.min_score)?;
        set_list(&get, "HIGH_IMPACT_JOURNALS", &mut scoring.high_impact_journals);

        let filter = &mut config.filter;
        filter.date_from = match get("DATE_FROM") {
            Some(raw) => Some(parse_date("DATE_FROM", &raw)?),
            None => {
                let mut window_days: u64 = 30;
                set_parsed(&get, "DATE_WINDOW_DAYS", &mut window_days)?;
                if window_days == 0 {
                    None
                } else {
                    Local::now().date_naive().checked_sub_days(Days::new(window_days))
                }
            }
        };
        filter.date_to = get("DATE_TO").map(|raw| parse_date("DATE_TO", &raw)).transpose()?;
        set_parsed(&get, "MIN_ABSTRACT_LENGTH", &mut filter.min_abstract_length)?;
        set_list(&get, "SEARCH_LANGUAGES", &mut filter.languages);

        set_bool(&get, "SUMMARY_ENABLED", &mut config.summary.enabled)?;
        set_parsed(&get, "SUMMARY_MAX_LENGTH", &mut config.summary.max_length)?;

        let schedule = &mut config.schedule;
        set_bool(&get, "SCHEDULE_ENABLED", &mut schedule.enabled)?;
        if let Some(raw) = get("SCHEDULE_TIME") {
            schedule.time = NaiveTime::parse_from_str(&raw, "%H:%M")
                .map_err(|_| invalid("SCHEDULE_TIME", &raw))?;
        }
        set_list(&get, "SCHEDULE_DAYS", &mut schedule.days);
        set_secs(&get, "SCHEDULE_POLL_INTERVAL", &mut schedule.poll_interval)?;
        set_secs(&get, "SCHEDULE_STOP_TIMEOUT", &mut schedule.stop_timeout)?;
        if schedule.poll_interval.is_zero() {
            return Err(invalid("SCHEDULE_POLL_INTERVAL", "0"));
        }

        if let Some(dir) = get("OUTPUT_DIR") {
            config.output.dir = PathBuf::from(dir);
        }
        set_bool(&get, "OUTPUT_DATE_FOLDERS", &mut config.output.date_folders)?;

        config.warn_suspicious();
        Ok(config)
    }

    /// Weights and thresholds are accepted as given; odd combinations only warn.
    fn warn_suspicious(&self) {
        let scoring = &self.scoring;
        if scoring.thresholds.high < scoring.thresholds.medium {
            warn!(
                high = scoring.thresholds.high,
                medium = scoring.thresholds.medium,
                "High threshold is below medium threshold; medium tier is unreachable"
            );
        }
        if scoring.required_weight < 0.0 || scoring.priority_weight < 0.0 {
            warn!(
                required_weight = scoring.required_weight,
                priority_weight = scoring.priority_weight,
                "Negative keyword weight configured"
            );
        }
        if let (Some(from), Some(to)) = (self.filter.date_from, self.filter.date_to) {
            if from > to {
                warn!(%from, %to, "Date window is empty; every dated paper will be excluded");
            }
        }
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse_date(key: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| invalid(key, raw))
}

fn set_parsed<G, T>(get: &G, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = get(key) {
        *slot = raw.parse().map_err(|_| invalid(key, &raw))?;
    }
    Ok(())
}

fn set_secs<G>(get: &G, key: &'static str, slot: &mut Duration) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        let secs: f64 = raw.parse().map_err(|_| invalid(key, &raw))?;
        *slot = Duration::try_from_secs_f64(secs).map_err(|_| invalid(key, &raw))?;
    }
    Ok(())
}

fn set_bool<G>(get: &G, key: &'static str, slot: &mut bool) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(invalid(key, &raw)),
        };
    }
    Ok(())
}

fn set_list<G>(get: &G, key: &'static str, slot: &mut Vec<String>)
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
    }
}
