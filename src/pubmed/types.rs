use std::fmt;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

/// PubMed identifier. Non-empty, unique per paper.
pub type Pmid = String;

/// Relevance tier derived from score and journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Relevance {
    High,
    Medium,
    #[default]
    Low,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::High => "high",
            Relevance::Medium => "medium",
            Relevance::Low => "low",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paper's metadata plus the fields computed by the pipeline stages.
#[derive(Debug, Clone)]
pub struct Paper {
    pub pmid: Pmid,
    pub title: String,
    /// "Given Family", in document order.
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub journal: String,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`; empty when the record carries no year.
    pub pub_date: String,
    pub doi: String,
    pub pmc_id: String,
    pub keywords: Vec<String>,
    pub mesh_terms: Vec<String>,
    pub publication_types: Vec<String>,
    pub language: String,
    pub grants: Vec<String>,
    pub url: String,
    pub collection_date: String,
    pub search_keyword: String,
    pub score: f64,
    pub relevance: Relevance,
    pub summary: String,
}

impl Paper {
    /// Lower-cased title, abstract, keywords and MeSH terms, space-joined.
    pub fn searchable_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.title,
            self.abstract_text,
            self.keywords.join(" "),
            self.mesh_terms.join(" ")
        )
        .to_lowercase()
    }

    /// Flat field mapping handed to the persistence layer.
    pub fn to_fields(&self) -> Map<String, Value> {
        let fields = json!({
            "title": self.title,
            "authors": self.authors.join(", "),
            "journal": self.journal,
            "pub_date": self.pub_date,
            "doi": self.doi,
            "pmid": self.pmid,
            "pmc_id": self.pmc_id,
            "keywords": self.keywords.join(", "),
            "abstract": self.abstract_text,
            "collection_date": self.collection_date,
            "search_keyword": self.search_keyword,
            "keyword_score": format!("{:.2}", self.score),
            "relevance_category": self.relevance.as_str(),
            "summary": self.summary,
            "language": self.language,
            "publication_type": self.publication_types.join(", "),
            "mesh_terms": self.mesh_terms.join(", "),
            "grants": self.grants.join(", "),
            "url": self.url,
        });
        match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// A publication date at whatever granularity the record provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubDate {
    Year(i32),
    YearMonth(i32, u32),
    Day(NaiveDate),
}

impl PubDate {
    /// Parse the normalized `YYYY[-MM[-DD]]` form. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.trim().split('-').collect();
        let numeric = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
        match parts.as_slice() {
            [y] if numeric(y, 4) => Some(PubDate::Year(y.parse().ok()?)),
            [y, m] if numeric(y, 4) && numeric(m, 2) => {
                let month: u32 = m.parse().ok()?;
                (1..=12)
                    .contains(&month)
                    .then_some(PubDate::YearMonth(y.parse().ok()?, month))
            }
            [y, m, d] if numeric(y, 4) && numeric(m, 2) && numeric(d, 2) => NaiveDate::from_ymd_opt(
                y.parse().ok()?,
                m.parse().ok()?,
                d.parse().ok()?,
            )
            .map(PubDate::Day),
            _ => None,
        }
    }
}
