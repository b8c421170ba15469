use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{debug, error, warn};

use super::types::{Paper, Pmid, Relevance};
use super::xml::Element;
use crate::config::Config;
use crate::error::ParseError;
use crate::pipeline::filter::Rejection;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const DEFAULT_LANGUAGE: &str = "eng";

const MONTHS: &[(&str, &str)] = &[
    ("Jan", "01"),
    ("Feb", "02"),
    ("Mar", "03"),
    ("Apr", "04"),
    ("May", "05"),
    ("Jun", "06"),
    ("Jul", "07"),
    ("Aug", "08"),
    ("Sep", "09"),
    ("Oct", "10"),
    ("Nov", "11"),
    ("Dec", "12"),
];

/// Strip markup and collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, "");
    SPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// `IdList/Id` values of an ESearch response, in order.
pub fn parse_search_ids(body: &str) -> Result<Vec<Pmid>, ParseError> {
    let root = Element::parse(body)?;
    let mut ids = Vec::new();
    for id in root.find_all(&["IdList", "Id"]) {
        let id = id.text()?.trim().to_string();
        if !id.is_empty() {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Outcome of extracting one `PubmedArticle`.
#[derive(Debug)]
pub enum Extracted {
    Paper(Box<Paper>),
    Dropped { pmid: Option<Pmid>, reason: Rejection },
}

/// Turns EFetch responses into seed [`Paper`]s.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    min_abstract_length: usize,
}

impl ResponseParser {
    pub fn new(config: &Config) -> Self {
        Self {
            min_abstract_length: config.filter.min_abstract_length,
        }
    }

    /// Every article in `body`, with the per-article drop decisions kept.
    /// A malformed document yields nothing; a malformed article is skipped.
    pub fn parse_detailed(&self, body: &str, search_keyword: &str) -> Vec<Extracted> {
        let root = match Element::parse(body) {
            Ok(root) => root,
            Err(e) => {
                error!(search_keyword, "EFetch response parsing error: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for article in root.find_all(&["PubmedArticle"]) {
            match self.extract(article, search_keyword) {
                Ok(extracted) => {
                    if let Extracted::Dropped { pmid, reason } = &extracted {
                        debug!(pmid = pmid.as_deref().unwrap_or(""), %reason, "Article dropped at parse time");
                    }
                    out.push(extracted);
                }
                Err(e) => warn!(search_keyword, "Error parsing individual paper: {}", e),
            }
        }
        out
    }

    /// Accepted papers only.
    #[cfg(test)]
    pub fn parse(&self, body: &str, search_keyword: &str) -> Vec<Paper> {
        self.parse_detailed(body, search_keyword)
            .into_iter()
            .filter_map(|extracted| match extracted {
                Extracted::Paper(paper) => Some(*paper),
                Extracted::Dropped { .. } => None,
            })
            .collect()
    }

    fn extract(&self, article: &Element, search_keyword: &str) -> Result<Extracted, ParseError> {
        let pmid = optional_text(article.find("PMID"))?.trim().to_string();
        let title = clean_text(&optional_text(article.find("ArticleTitle"))?);

        if pmid.is_empty() {
            return Ok(Extracted::Dropped {
                pmid: None,
                reason: Rejection::MissingIdentifier,
            });
        }
        if title.is_empty() {
            return Ok(Extracted::Dropped {
                pmid: Some(pmid),
                reason: Rejection::MissingTitle,
            });
        }

        let abstract_text = extract_abstract(article)?;
        if abstract_text.chars().count() < self.min_abstract_length {
            return Ok(Extracted::Dropped {
                pmid: Some(pmid),
                reason: Rejection::AbstractTooShort {
                    length: abstract_text.chars().count(),
                    minimum: self.min_abstract_length,
                },
            });
        }

        let language = optional_text(article.find("Language"))?;
        let paper = Paper {
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid),
            title,
            authors: extract_authors(article)?,
            abstract_text,
            journal: optional_text(article.find_path(&["Journal", "Title"]))?,
            pub_date: extract_pub_date(article)?,
            doi: article_id(article, "doi")?,
            pmc_id: article_id(article, "pmc")?,
            keywords: texts(article, &["KeywordList", "Keyword"])?,
            mesh_terms: texts(article, &["MeshHeadingList", "MeshHeading", "DescriptorName"])?,
            publication_types: texts(article, &["PublicationType"])?,
            language: if language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language
            },
            grants: texts(article, &["GrantList", "Grant", "GrantID"])?,
            collection_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            search_keyword: search_keyword.to_string(),
            score: 0.0,
            relevance: Relevance::default(),
            summary: String::new(),
            pmid,
        };
        Ok(Extracted::Paper(Box::new(paper)))
    }
}

fn optional_text(element: Option<&Element>) -> Result<String, ParseError> {
    match element {
        Some(e) => e.text(),
        None => Ok(String::new()),
    }
}

/// Non-empty texts along `path`, in document order.
fn texts(article: &Element, path: &[&str]) -> Result<Vec<String>, ParseError> {
    let mut out = Vec::new();
    for element in article.find_all(path) {
        let text = element.text()?;
        if !text.is_empty() {
            out.push(text);
        }
    }
    Ok(out)
}

fn extract_abstract(article: &Element) -> Result<String, ParseError> {
    let mut parts = Vec::new();
    for section in article.find_all(&["Abstract", "AbstractText"]) {
        let text = section.text()?;
        match section.attr("Label")?.filter(|l| !l.is_empty()) {
            Some(label) => parts.push(format!("{}: {}", label, text)),
            None => parts.push(text),
        }
    }
    Ok(clean_text(&parts.join(" ")))
}

fn extract_authors(article: &Element) -> Result<Vec<String>, ParseError> {
    let mut authors = Vec::new();
    for author in article.find_all(&["AuthorList", "Author"]) {
        let given = optional_text(author.child("ForeName"))?;
        let family = optional_text(author.child("LastName"))?;
        if !given.is_empty() && !family.is_empty() {
            authors.push(format!("{} {}", given, family));
        }
    }
    Ok(authors)
}

/// First `ArticleId` with the given `IdType`, or empty.
fn article_id(article: &Element, id_type: &str) -> Result<String, ParseError> {
    for id in article.find_all(&["ArticleIdList", "ArticleId"]) {
        if id.attr("IdType")?.as_deref() == Some(id_type) {
            return id.text();
        }
    }
    Ok(String::new())
}

/// `YYYY`, `YYYY-MM` or `YYYY-MM-DD` from the first `PubDate`.
fn extract_pub_date(article: &Element) -> Result<String, ParseError> {
    let Some(pub_date) = article.find("PubDate") else {
        return Ok(String::new());
    };
    let year = optional_text(pub_date.child("Year"))?;
    let mut month = optional_text(pub_date.child("Month"))?;
    let mut day = optional_text(pub_date.child("Day"))?;

    if let Some((_, number)) = MONTHS.iter().find(|(name, _)| *name == month) {
        month = number.to_string();
    } else if is_digits(&month) {
        month = format!("{:0>2}", month);
    }
    if is_digits(&day) {
        day = format!("{:0>2}", day);
    }

    Ok(match (year.is_empty(), month.is_empty(), day.is_empty()) {
        (true, _, _) => String::new(),
        (false, false, false) => format!("{}-{}-{}", year, month, day),
        (false, false, true) => format!("{}-{}", year, month),
        (false, true, _) => year,
    })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
