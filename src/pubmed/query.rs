use chrono::NaiveDate;

use crate::config::{FilterConfig, DATE_FORMAT};

/// Composes the ESearch `term` for one keyword.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
    languages: Vec<String>,
}

impl QueryBuilder {
    pub fn new(filter: &FilterConfig) -> Self {
        Self {
            date_from: filter.date_from,
            date_to: filter.date_to,
            languages: filter.languages.clone(),
        }
    }

    /// `keyword[All Fields]` ANDed with the date and language clauses.
    /// An open upper date bound becomes `today`.
    pub fn build(&self, keyword: &str, today: NaiveDate) -> String {
        let mut filters = Vec::new();

        if let Some(from) = self.date_from {
            let to = self.date_to.unwrap_or(today);
            filters.push(format!(
                "(\"{}\"[Publication Date] : \"{}\"[Publication Date])",
                from.format(DATE_FORMAT),
                to.format(DATE_FORMAT)
            ));
        }

        if !self.languages.is_empty() {
            let langs = self
                .languages
                .iter()
                .map(|lang| format!("\"{}\"[Language]", lang))
                .collect::<Vec<_>>()
                .join(" OR ");
            filters.push(format!("({})", langs));
        }

        let base = format!("{}[All Fields]", keyword);
        if filters.is_empty() {
            base
        } else {
            format!("{} AND {}", base, filters.join(" AND "))
        }
    }
}
