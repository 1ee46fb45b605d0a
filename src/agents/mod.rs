//! Format-specific extraction agents.
//!
//! One agent per [`DocumentFormat`]. The orchestrator looks the agent up by
//! the classifier's format and runs it; `Other` has no agent.

pub mod compliance;
pub mod email;
pub mod json;
pub mod pdf;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::AgentFault;
use crate::extract::TextExtractor;
use crate::pipeline::types::{ClassificationResult, DocumentFormat, ExtractionRecord, RawInput};

pub use compliance::ComplianceMatcher;
pub use email::EmailAgent;
pub use json::JsonAgent;
pub use pdf::PdfAgent;

/// An extraction agent turns a classified input into a structured record.
///
/// Expected problems (missing headers, unknown JSON shape, unreadable PDF)
/// belong on the returned record as a status marker. `Err` is for faults the
/// agent could not contain.
pub trait ExtractionAgent: Send + Sync {
    /// Agent name for logs and fault records.
    fn name(&self) -> &str;

    /// The format this agent handles.
    fn format(&self) -> DocumentFormat;

    fn process(
        &self,
        input: &RawInput,
        classification: &ClassificationResult,
    ) -> Result<ExtractionRecord, AgentFault>;
}

/// Agents keyed by the format they handle.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<DocumentFormat, Arc<dyn ExtractionAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the email, JSON and PDF agents.
    pub fn with_defaults(
        compliance: Arc<ComplianceMatcher>,
        extractor: Arc<dyn TextExtractor>,
        summary_lines: usize,
        summary_max_chars: usize,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailAgent::new(summary_max_chars)));
        registry.register(Arc::new(JsonAgent::new()));
        registry.register(Arc::new(PdfAgent::new(
            extractor,
            compliance,
            summary_lines,
            summary_max_chars,
        )));
        registry
    }

    /// Register an agent, replacing any agent already bound to its format.
    pub fn register(&mut self, agent: Arc<dyn ExtractionAgent>) {
        let format = agent.format();
        if let Some(previous) = self.agents.insert(format, agent) {
            debug!(format = %format, replaced = previous.name(), "Replaced extraction agent");
        }
    }

    pub fn for_format(&self, format: DocumentFormat) -> Option<Arc<dyn ExtractionAgent>> {
        self.agents.get(&format).cloned()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

const ELLIPSIS: &str = "...";

/// Truncate to at most `max` characters, ending with "..." when cut. The
/// ellipsis itself shrinks when `max` is below its length.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let marker = &ELLIPSIS[..ELLIPSIS.len().min(max)];
    let mut out: String = text.chars().take(max - marker.len()).collect();
    out.truncate(out.trim_end().len());
    out.push_str(marker);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::PdfTextExtractor;

    struct StubAgent(&'static str);

    impl ExtractionAgent for StubAgent {
        fn name(&self) -> &str {
            self.0
        }

        fn format(&self) -> DocumentFormat {
            DocumentFormat::Email
        }

        fn process(
            &self,
            _input: &RawInput,
            _classification: &ClassificationResult,
        ) -> Result<ExtractionRecord, AgentFault> {
            Err(AgentFault::new(self.0, "stub"))
        }
    }

    #[test]
    fn defaults_cover_three_formats() {
        let registry = AgentRegistry::with_defaults(
            Arc::new(ComplianceMatcher::with_defaults()),
            Arc::new(PdfTextExtractor),
            3,
            500,
        );
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.for_format(DocumentFormat::Json).unwrap().name(),
            "json_agent"
        );
        assert!(registry.for_format(DocumentFormat::Other).is_none());
    }

    #[test]
    fn register_replaces_same_format() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(StubAgent("first")));
        registry.register(Arc::new(StubAgent("second")));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.for_format(DocumentFormat::Email).unwrap().name(),
            "second"
        );
    }

    #[test]
    fn truncate_chars_marks_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_chars("héllo wörld", 11), "héllo wörld");
    }

    #[test]
    fn truncate_chars_never_exceeds_tiny_limits() {
        assert_eq!(truncate_chars("abcdef", 3), "...");
        assert_eq!(truncate_chars("abcdef", 2), "..");
        assert_eq!(truncate_chars("abcdef", 1), ".");
        assert_eq!(truncate_chars("abcdef", 0), "");
    }
}
