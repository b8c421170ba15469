use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::OutputConfig;
use crate::pubmed::types::{Paper, Relevance};

const DOCUMENT_TEMPLATE: &str = "# {title}

## Summary
{summary}

## Paper Information
- **Title**: {title}
- **Authors**: {authors}
- **Journal**: {journal}
- **Publication Date**: {pub_date}
- **DOI**: {doi}
- **PMID**: {pmid}
- **PMC ID**: {pmc_id}
- **Keywords**: {keywords}

## Abstract
{abstract}

## Collection Information
- **Collection Date**: {collection_date}
- **Search Keywords**: {search_keyword}
- **Keyword Matching Score**: {keyword_score}
- **Relevance Category**: {relevance_category}
- **PubMed URL**: {url}

## Metadata
- **Language**: {language}
- **Publication Type**: {publication_type}
- **MeSH Terms**: {mesh_terms}
- **Grant Information**: {grants}

---
*This document was automatically generated by Paper Surfer.*
";

fn tier_dir(relevance: Relevance) -> String {
    format!("{}_relevance", relevance.as_str())
}

/// PMIDs are digits; anything else is dropped so the name stays inside its folder.
fn file_name(pmid: &str) -> String {
    let safe: String = pmid.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("paper_{}.md", safe)
}

/// Aggregate view over everything written so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub output_dir: PathBuf,
    pub total_files: usize,
}

/// Receives each completed paper exactly once.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist one paper; returns where it went.
    async fn save(&self, paper: &Paper) -> Result<PathBuf>;

    async fn summary(&self) -> StoreSummary;
}

/// Writes one markdown document per paper under
/// `{dir}/{YYYY-MM-DD}/{tier}_relevance/paper_{pmid}.md`.
pub struct MarkdownStore {
    dir: PathBuf,
    date_folders: bool,
}

impl MarkdownStore {
    pub fn new(output: &OutputConfig) -> Result<Self> {
        std::fs::create_dir_all(&output.dir)
            .with_context(|| format!("Failed to create output directory {:?}", output.dir))?;
        Ok(Self {
            dir: output.dir.clone(),
            date_folders: output.date_folders,
        })
    }

    fn path_for(&self, paper: &Paper) -> PathBuf {
        let mut path = self.dir.clone();
        if self.date_folders {
            path.push(Local::now().format("%Y-%m-%d").to_string());
        }
        path.push(tier_dir(paper.relevance));
        path.push(file_name(&paper.pmid));
        path
    }

    /// Fill the document template from the paper's flat field mapping.
    /// Inserted values are never rescanned for placeholders.
    pub fn render(paper: &Paper) -> String {
        let fields = paper.to_fields();
        let mut doc = String::with_capacity(DOCUMENT_TEMPLATE.len() * 2);
        let mut rest = DOCUMENT_TEMPLATE;
        while let Some(open) = rest.find('{') {
            doc.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after
                .find('}')
                .and_then(|close| fields.get(&after[..close]).map(|v| (close, v)));
            match value {
                Some((close, value)) => {
                    match value {
                        Value::String(s) => doc.push_str(s),
                        other => doc.push_str(&other.to_string()),
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    doc.push('{');
                    rest = after;
                }
            }
        }
        doc.push_str(rest);
        doc
    }
}

/// Markdown files under `dir`, at any depth.
async fn count_markdown(dir: &Path) -> usize {
    let mut pending = vec![dir.to_path_buf()];
    let mut total = 0;
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read {:?}: {}", dir, e);
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read entry in {:?}: {}", dir, e);
                    break;
                }
            };
            let path = entry.path();
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push(path),
                Ok(_) if path.extension().is_some_and(|ext| ext == "md") => total += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to stat {:?}: {}", path, e),
            }
        }
    }
    total
}

#[async_trait]
impl RecordSink for MarkdownStore {
    async fn save(&self, paper: &Paper) -> Result<PathBuf> {
        let path = self.path_for(paper);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        tokio::fs::write(&path, Self::render(paper))
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        debug!(pmid = %paper.pmid, path = ?path, "Paper saved");
        Ok(path)
    }

    async fn summary(&self) -> StoreSummary {
        StoreSummary {
            output_dir: self.dir.clone(),
            total_files: count_markdown(&self.dir).await,
        }
    }
}
