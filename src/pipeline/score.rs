use tracing::info;

use crate::config::{Config, Thresholds};
use crate::pubmed::types::{Paper, Relevance};

const TITLE_BONUS: f64 = 0.5;
const ABSTRACT_BONUS: f64 = 0.2;
const NORMALIZER: f64 = 5.0;

/// Keyword relevance score in `[0, 1]`.
///
/// All matching is case-insensitive substring containment, so "serv" also
/// matches inside "observation". Scores depend on that.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    required: Vec<String>,
    priority: Vec<String>,
    required_weight: f64,
    priority_weight: f64,
}

fn fraction_found(text: &str, terms: &[String]) -> f64 {
    if text.is_empty() || terms.is_empty() {
        return 0.0;
    }
    let found = terms.iter().filter(|t| text.contains(t.as_str())).count();
    found as f64 / terms.len() as f64
}

impl RelevanceScorer {
    pub fn new(config: &Config) -> Self {
        let lower = |terms: &[String]| terms.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>();
        Self {
            required: lower(&config.scoring.required_keywords),
            priority: lower(&config.scoring.priority_keywords),
            required_weight: config.scoring.required_weight,
            priority_weight: config.scoring.priority_weight,
        }
    }

    pub fn score(&self, paper: &Paper) -> f64 {
        let title = paper.title.to_lowercase();
        let abstract_text = paper.abstract_text.to_lowercase();
        let all_text = paper.searchable_text();

        let search_tokens: Vec<String> = paper
            .search_keyword
            .to_lowercase()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let base = fraction_found(&all_text, &search_tokens);

        let required = if self.required.is_empty() {
            0.0
        } else {
            fraction_found(&all_text, &self.required) * self.required_weight
        };
        let priority = if self.priority.is_empty() {
            0.0
        } else {
            fraction_found(&all_text, &self.priority) * self.priority_weight
        };

        let important = || self.required.iter().chain(self.priority.iter());
        let title_hits = important().filter(|t| title.contains(t.as_str())).count();
        let abstract_hits = important().filter(|t| abstract_text.contains(t.as_str())).count();
        let title_bonus = TITLE_BONUS * title_hits as f64;
        let abstract_bonus = ABSTRACT_BONUS * abstract_hits as f64;

        let total = base + required + priority + title_bonus + abstract_bonus;
        (total / NORMALIZER).clamp(0.0, 1.0)
    }
}

/// Maps score and journal to a [`Relevance`] tier.
#[derive(Debug, Clone)]
pub struct Categorizer {
    thresholds: Thresholds,
    high_impact_journals: Vec<String>,
}

impl Categorizer {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: config.scoring.thresholds,
            high_impact_journals: config
                .scoring
                .high_impact_journals
                .iter()
                .map(|j| j.to_lowercase())
                .collect(),
        }
    }

    /// High-impact journals win before any threshold is consulted.
    pub fn categorize(&self, score: f64, journal: &str) -> Relevance {
        if !journal.is_empty() {
            let journal_lower = journal.to_lowercase();
            if self
                .high_impact_journals
                .iter()
                .any(|j| journal_lower.contains(j.as_str()))
            {
                info!(journal, "High-impact journal, categorized as high relevance");
                return Relevance::High;
            }
        }

        if score >= self.thresholds.high {
            Relevance::High
        } else if score >= self.thresholds.medium {
            Relevance::Medium
        } else {
            Relevance::Low
        }
    }
}
