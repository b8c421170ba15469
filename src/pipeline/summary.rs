use crate::config::Config;
use crate::pubmed::types::Paper;

const FALLBACK: &str = "A research paper in the field of medicine and life sciences.";
const ELLIPSIS: &str = "...";

/// Produces the short description attached to each accepted paper.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, paper: &Paper) -> String;
}

/// Marker-based summary: topic, method, purpose and context terms are
/// looked up in the lowercased title and abstract and stitched into a
/// fixed sentence shape.
#[derive(Debug, Clone)]
pub struct TemplateSummarizer {
    enabled: bool,
    max_length: usize,
}

impl TemplateSummarizer {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.summary.enabled,
            max_length: config.summary.max_length,
        }
    }

    fn topic_and_methods(title: &str, abstract_text: &str) -> Vec<&'static str> {
        let mut parts = Vec::new();
        if title.contains("breast cancer") {
            parts.push("Breast Cancer");
        } else if title.contains("cancer") {
            parts.push("Cancer");
        }
        if title.contains("sequencing") || abstract_text.contains("sequencing") {
            parts.push("Sequencing");
        }
        if title.contains("genomics") || title.contains("genomic") {
            parts.push("Genomics");
        }
        if title.contains("mutation") || abstract_text.contains("mutation") {
            parts.push("Mutation");
        }
        parts
    }

    fn purpose(title: &str, abstract_text: &str) -> Option<&'static str> {
        if abstract_text.contains("treatment") || abstract_text.contains("therapy") {
            Some("Treatment Method")
        } else if abstract_text.contains("diagnosis") {
            Some("Diagnosis Method")
        } else if title.contains("analysis") || abstract_text.contains("analysis") {
            Some("Analysis")
        } else if title.contains("study") {
            Some("Study")
        } else {
            None
        }
    }

    fn context(abstract_text: &str) -> Vec<&'static str> {
        let mut context = Vec::new();
        if abstract_text.contains("patient") {
            context.push("Utilized patient data");
        }
        if abstract_text.contains("clinical") {
            context.push("Clinical study");
        }
        if abstract_text.contains("genomic") || abstract_text.contains("genetic") {
            context.push("Genetic approach");
        }
        if abstract_text.contains("therapeutic") {
            context.push("Therapeutic approach");
        }
        context
    }

    fn truncate(&self, text: String) -> String {
        if text.chars().count() <= self.max_length {
            return text;
        }
        if self.max_length < ELLIPSIS.len() {
            return text.chars().take(self.max_length).collect();
        }
        let keep = self.max_length.saturating_sub(ELLIPSIS.len());
        let mut out: String = text.chars().take(keep).collect();
        out.push_str(ELLIPSIS);
        out
    }
}

impl Summarizer for TemplateSummarizer {
    fn summarize(&self, paper: &Paper) -> String {
        if !self.enabled {
            return String::new();
        }
        let title = paper.title.to_lowercase();
        let abstract_text = paper.abstract_text.to_lowercase();

        let parts = Self::topic_and_methods(&title, &abstract_text);
        let mut summary = if parts.is_empty() {
            FALLBACK.to_string()
        } else {
            // No space before "research." when there is no purpose.
            let mut s = format!("This study is about {}.", parts.join(", "));
            if let Some(purpose) = Self::purpose(&title, &abstract_text) {
                s.push_str(&format!(" {} ", purpose));
            }
            s.push_str("research.");
            s
        };

        let context = Self::context(&abstract_text);
        if !context.is_empty() {
            summary.push_str(&format!(" Providing new insights through {}.", context.join(", ")));
        }

        self.truncate(summary)
    }
}
