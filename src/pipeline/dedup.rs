use std::collections::HashSet;

use crate::pubmed::types::{Paper, Pmid};

/// Merges papers from several keyword searches, one per PMID.
/// First occurrence wins; insertion order is preserved.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<Pmid>,
    papers: Vec<Paper>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the PMID was already present.
    pub fn insert(&mut self, paper: Paper) -> bool {
        if !self.seen.insert(paper.pmid.clone()) {
            return false;
        }
        self.papers.push(paper);
        true
    }

    pub fn extend(&mut self, papers: impl IntoIterator<Item = Paper>) -> usize {
        let mut added = 0;
        for paper in papers {
            if self.insert(paper) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn into_papers(self) -> Vec<Paper> {
        self.papers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filter::tests::paper;

    fn from_keyword(pmid: &str, keyword: &str) -> Paper {
        Paper {
            search_keyword: keyword.to_string(),
            ..paper(pmid)
        }
    }

    #[test]
    fn test_first_keyword_wins() {
        let mut dedup = Deduplicator::new();
        let added = dedup.extend(vec![from_keyword("1", "alpha"), from_keyword("2", "alpha")]);
        assert_eq!(added, 2);
        let added = dedup.extend(vec![from_keyword("2", "beta"), from_keyword("3", "beta")]);
        assert_eq!(added, 1);

        let papers = dedup.into_papers();
        let ids: Vec<&str> = papers.iter().map(|p| p.pmid.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(papers[1].search_keyword, "alpha");
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut dedup = Deduplicator::new();
        assert!(dedup.is_empty());
        assert!(dedup.insert(paper("9")));
        assert!(!dedup.insert(paper("9")));
        assert_eq!(dedup.len(), 1);
    }
}
