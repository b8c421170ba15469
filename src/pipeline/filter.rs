use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::config::Config;
use crate::pubmed::types::{Paper, PubDate};

/// Why a paper was excluded. Exclusions are not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MissingIdentifier,
    MissingTitle,
    AbstractTooShort { length: usize, minimum: usize },
    BeforeDateWindow { date: String, from: NaiveDate },
    AfterDateWindow { date: String, to: NaiveDate },
    MissingRequiredTerm(String),
    BelowScoreThreshold { score: f64, minimum: f64 },
}

impl Rejection {
    /// Stable short name, used for tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MissingIdentifier => "missing_identifier",
            Rejection::MissingTitle => "missing_title",
            Rejection::AbstractTooShort { .. } => "abstract_too_short",
            Rejection::BeforeDateWindow { .. } => "before_date_window",
            Rejection::AfterDateWindow { .. } => "after_date_window",
            Rejection::MissingRequiredTerm(_) => "missing_required_term",
            Rejection::BelowScoreThreshold { .. } => "below_score_threshold",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingIdentifier => write!(f, "missing PMID"),
            Rejection::MissingTitle => write!(f, "missing title"),
            Rejection::AbstractTooShort { length, minimum } => {
                write!(f, "abstract too short ({} < {})", length, minimum)
            }
            Rejection::BeforeDateWindow { date, from } => write!(f, "{} is before {}", date, from),
            Rejection::AfterDateWindow { date, to } => write!(f, "{} is after {}", date, to),
            Rejection::MissingRequiredTerm(term) => write!(f, "required term '{}' absent", term),
            Rejection::BelowScoreThreshold { score, minimum } => {
                write!(f, "score {:.3} below {:.3}", score, minimum)
            }
        }
    }
}

/// Admission decision of one filter stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(Rejection),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Compare a publication date with a bound at the date's own granularity.
fn compare_at_granularity(date: PubDate, bound: NaiveDate) -> Ordering {
    match date {
        PubDate::Year(y) => y.cmp(&bound.year()),
        PubDate::YearMonth(y, m) => (y, m).cmp(&(bound.year(), bound.month())),
        PubDate::Day(d) => d.cmp(&bound),
    }
}

/// Publication-date window. Inactive without a lower bound; undated or
/// unparsable papers always pass.
#[derive(Debug, Clone)]
pub struct DateFilter {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

impl DateFilter {
    pub fn new(config: &Config) -> Self {
        Self {
            from: config.filter.date_from,
            to: config.filter.date_to,
        }
    }

    pub fn is_active(&self) -> bool {
        self.from.is_some()
    }

    pub fn check(&self, paper: &Paper) -> Verdict {
        let Some(from) = self.from else {
            return Verdict::Accept;
        };
        let Some(date) = PubDate::parse(&paper.pub_date) else {
            return Verdict::Accept;
        };
        if compare_at_granularity(date, from) == Ordering::Less {
            return Verdict::Reject(Rejection::BeforeDateWindow {
                date: paper.pub_date.clone(),
                from,
            });
        }
        if let Some(to) = self.to {
            if compare_at_granularity(date, to) == Ordering::Greater {
                return Verdict::Reject(Rejection::AfterDateWindow {
                    date: paper.pub_date.clone(),
                    to,
                });
            }
        }
        Verdict::Accept
    }
}

/// Every required term must occur (case-insensitive substring) in the
/// paper's searchable text. No terms configured means always accept.
#[derive(Debug, Clone)]
pub struct RequiredKeywordFilter {
    terms: Vec<String>,
}

impl RequiredKeywordFilter {
    pub fn new(config: &Config) -> Self {
        Self {
            terms: config.scoring.required_keywords.clone(),
        }
    }

    pub fn check(&self, paper: &Paper) -> Verdict {
        if self.terms.is_empty() {
            return Verdict::Accept;
        }
        let text = paper.searchable_text();
        match self.terms.iter().find(|term| !text.contains(&term.to_lowercase())) {
            Some(missing) => Verdict::Reject(Rejection::MissingRequiredTerm(missing.clone())),
            None => Verdict::Accept,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn paper(pmid: &str) -> Paper {
        Paper {
            pmid: pmid.to_string(),
            title: "A title".to_string(),
            authors: vec![],
            abstract_text: String::new(),
            journal: String::new(),
            pub_date: String::new(),
            doi: String::new(),
            pmc_id: String::new(),
            keywords: vec![],
            mesh_terms: vec![],
            publication_types: vec![],
            language: "eng".to_string(),
            grants: vec![],
            url: String::new(),
            collection_date: String::new(),
            search_keyword: String::new(),
            score: 0.0,
            relevance: Default::default(),
            summary: String::new(),
        }
    }

    fn dated(date: &str) -> Paper {
        Paper {
            pub_date: date.to_string(),
            ..paper("1")
        }
    }

    fn date_filter(from: Option<(i32, u32, u32)>, to: Option<(i32, u32, u32)>) -> DateFilter {
        let mut config = Config::default();
        config.filter.date_from = from.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        config.filter.date_to = to.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d));
        DateFilter::new(&config)
    }

    #[test]
    fn test_year_only_date_excluded_at_year_granularity() {
        let filter = date_filter(Some((2021, 1, 1)), None);
        assert!(matches!(
            filter.check(&dated("2020")),
            Verdict::Reject(Rejection::BeforeDateWindow { .. })
        ));
        assert!(filter.check(&dated("2021")).is_accept());
    }

    #[test]
    fn test_coarse_dates_not_treated_as_first_of_period() {
        let filter = date_filter(Some((2021, 3, 15)), Some((2021, 6, 10)));
        // Same month as either bound passes at month granularity.
        assert!(filter.check(&dated("2021-03")).is_accept());
        assert!(filter.check(&dated("2021-06")).is_accept());
        assert!(filter.check(&dated("2021")).is_accept());
        assert!(!filter.check(&dated("2021-02")).is_accept());
        assert!(matches!(
            filter.check(&dated("2021-07")),
            Verdict::Reject(Rejection::AfterDateWindow { .. })
        ));
    }

    #[test]
    fn test_day_granularity_bounds_inclusive() {
        let filter = date_filter(Some((2021, 3, 15)), Some((2021, 6, 10)));
        assert!(filter.check(&dated("2021-03-15")).is_accept());
        assert!(filter.check(&dated("2021-06-10")).is_accept());
        assert!(!filter.check(&dated("2021-03-14")).is_accept());
        assert!(!filter.check(&dated("2021-06-11")).is_accept());
    }

    #[test]
    fn test_unparsable_or_missing_date_passes() {
        let filter = date_filter(Some((2021, 1, 1)), None);
        assert!(filter.check(&dated("Spring 2019")).is_accept());
        assert!(filter.check(&dated("")).is_accept());
    }

    #[test]
    fn test_inactive_without_lower_bound() {
        let filter = date_filter(None, Some((2000, 1, 1)));
        assert!(!filter.is_active());
        assert!(filter.check(&dated("2020-01-01")).is_accept());
    }

    fn required(terms: &[&str]) -> RequiredKeywordFilter {
        RequiredKeywordFilter {
            terms: terms.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_required_terms_case_insensitive() {
        let p = Paper {
            title: "Genomic landscape of Breast Cancer".to_string(),
            ..paper("1")
        };
        assert!(required(&["breast cancer"]).check(&p).is_accept());
        assert!(required(&["BREAST CANCER"]).check(&p).is_accept());
    }

    #[test]
    fn test_required_terms_searched_across_fields() {
        let p = Paper {
            title: "Tumour study".to_string(),
            abstract_text: "We sequenced samples.".to_string(),
            keywords: vec!["Mutation".to_string()],
            mesh_terms: vec!["Breast Neoplasms".to_string()],
            ..paper("1")
        };
        assert!(required(&["mutation", "neoplasms", "sequenced"]).check(&p).is_accept());
        assert_eq!(
            required(&["mutation", "cancer"]).check(&p),
            Verdict::Reject(Rejection::MissingRequiredTerm("cancer".to_string()))
        );
    }

    #[test]
    fn test_no_required_terms_always_passes() {
        assert!(required(&[]).check(&paper("1")).is_accept());
    }
}
