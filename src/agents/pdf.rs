//! PDF extraction agent.
//!
//! Accepts either a binary PDF (text pulled out through the injected
//! [`TextExtractor`]) or text that was already extracted upstream.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::agents::compliance::ComplianceMatcher;
use crate::agents::{ExtractionAgent, truncate_chars};
use crate::error::AgentFault;
use crate::extract::TextExtractor;
use crate::pipeline::types::{
    ClassificationResult, DocumentFormat, ExtractionRecord, ExtractionStatus, PdfDocumentType,
    PdfRecord, RawInput,
};

const TITLE_MAX_CHARS: usize = 150;

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(page\s*)?\d+(\s*(of|/)\s*\d+)?$").unwrap());

static INVOICE_DOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(invoice|amount due|total due|bill to|remit to|payment terms)\b").unwrap()
});

static POLICY_DOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(polic(y|ies)|terms and conditions|code of conduct|procedures?|regulations?|compliance|shall)\b",
    )
    .unwrap()
});

static REPORT_DOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(report|analysis|findings|quarterly|annual review|executive summary)\b")
        .unwrap()
});

/// Derives title, summary, type and compliance flags from document text.
pub struct PdfAgent {
    extractor: Arc<dyn TextExtractor>,
    compliance: Arc<ComplianceMatcher>,
    summary_lines: usize,
    summary_max_chars: usize,
}

impl PdfAgent {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        compliance: Arc<ComplianceMatcher>,
        summary_lines: usize,
        summary_max_chars: usize,
    ) -> Self {
        Self {
            extractor,
            compliance,
            summary_lines,
            summary_max_chars,
        }
    }

    fn document_text(&self, input: &RawInput) -> String {
        if !input.is_pdf_binary() {
            return input.as_text().into_owned();
        }
        match self.extractor.extract_text(input.payload()) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    error = %e,
                    filename = input.filename().unwrap_or("-"),
                    "PDF text extraction failed; continuing with empty text"
                );
                String::new()
            }
        }
    }

    fn analyze(&self, text: &str) -> PdfRecord {
        let lines = meaningful_lines(text);

        let title = lines.first().map(|l| truncate_chars(l, TITLE_MAX_CHARS));
        let summary = truncate_chars(
            &lines
                .iter()
                .take(self.summary_lines)
                .copied()
                .collect::<Vec<_>>()
                .join(" "),
            self.summary_max_chars,
        );

        let status = if text.trim().is_empty() {
            ExtractionStatus::MalformedInput
        } else if lines.is_empty() {
            ExtractionStatus::Partial
        } else {
            ExtractionStatus::Complete
        };

        PdfRecord {
            status,
            title,
            summary,
            document_type: classify_document(text),
            regulatory_compliance_flags: self.compliance.scan(text),
            text_length: text.chars().count(),
        }
    }
}

impl ExtractionAgent for PdfAgent {
    fn name(&self) -> &str {
        "pdf_agent"
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn process(
        &self,
        input: &RawInput,
        _classification: &ClassificationResult,
    ) -> Result<ExtractionRecord, AgentFault> {
        let text = self.document_text(input);
        let record = self.analyze(&text);
        debug!(
            text_length = record.text_length,
            matched = ?record.regulatory_compliance_flags.matched_keywords,
            "PDF analyzed"
        );
        Ok(ExtractionRecord::Pdf(record))
    }
}

/// Non-blank lines with some letters in them, skipping page numbers.
fn meaningful_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|l| l.chars().filter(|c| c.is_alphabetic()).count() >= 2)
        .filter(|l| !PAGE_MARKER.is_match(l))
        .collect()
}

fn classify_document(text: &str) -> PdfDocumentType {
    if INVOICE_DOC.is_match(text) {
        PdfDocumentType::Invoice
    } else if POLICY_DOC.is_match(text) {
        PdfDocumentType::Policy
    } else if REPORT_DOC.is_match(text) {
        PdfDocumentType::Report
    } else {
        PdfDocumentType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;

    struct FixedExtractor(Result<&'static str, &'static str>);

    impl TextExtractor for FixedExtractor {
        fn extract_text(&self, _bytes: &[u8]) -> Result<String, ExtractError> {
            self.0
                .map(str::to_string)
                .map_err(|e| ExtractError::Unreadable(e.to_string()))
        }
    }

    fn agent(extractor: FixedExtractor) -> PdfAgent {
        PdfAgent::new(
            Arc::new(extractor),
            Arc::new(ComplianceMatcher::with_defaults()),
            3,
            500,
        )
    }

    fn run(agent: &PdfAgent, input: RawInput) -> PdfRecord {
        let classification = ClassificationResult {
            format: DocumentFormat::Pdf,
            intent: crate::pipeline::types::Intent::Regulation,
            confidence: None,
        };
        match agent.process(&input, &classification).unwrap() {
            ExtractionRecord::Pdf(record) => record,
            other => panic!("expected PDF record, got {other:?}"),
        }
    }

    #[test]
    fn extracted_text_with_regulations() {
        let agent = agent(FixedExtractor(Err("unused")));
        let record = run(
            &agent,
            RawInput::text(
                "Data Protection Policy\n\n1\nThis policy describes how we meet GDPR requirements.\n\
                 Patient records are handled under HIPAA.\nAppendix A",
            ),
        );
        assert_eq!(record.title.as_deref(), Some("Data Protection Policy"));
        assert_eq!(
            record.summary,
            "Data Protection Policy This policy describes how we meet GDPR requirements. \
             Patient records are handled under HIPAA."
        );
        assert_eq!(record.document_type, PdfDocumentType::Policy);
        assert!(record.regulatory_compliance_flags.get("contains_gdpr_keywords"));
        assert!(record.regulatory_compliance_flags.get("contains_hipaa_keywords"));
        assert_eq!(record.status, ExtractionStatus::Complete);
    }

    #[test]
    fn binary_pdf_goes_through_extractor() {
        let agent = agent(FixedExtractor(Ok("INVOICE 2024-17\nAmount due: 300 EUR")));
        let record = run(&agent, RawInput::file("inv.pdf", b"%PDF-1.5 binary".to_vec()));
        assert_eq!(record.title.as_deref(), Some("INVOICE 2024-17"));
        assert_eq!(record.document_type, PdfDocumentType::Invoice);
        assert!(!record.regulatory_compliance_flags.any());
    }

    #[test]
    fn unreadable_pdf_yields_empty_record() {
        let agent = agent(FixedExtractor(Err("corrupt xref")));
        let record = run(&agent, RawInput::file("bad.pdf", b"%PDF-1.4 garbage".to_vec()));
        assert_eq!(record.status, ExtractionStatus::MalformedInput);
        assert!(record.summary.is_empty());
        assert!(record.title.is_none());
        assert!(!record.regulatory_compliance_flags.any());
        assert!(record.regulatory_compliance_flags.matched_keywords.is_empty());
        assert_eq!(record.document_type, PdfDocumentType::Other);
    }

    #[test]
    fn page_markers_are_not_meaningful() {
        assert_eq!(
            meaningful_lines("Page 1 of 4\n  12  \nQuarterly Report\n3/4"),
            vec!["Quarterly Report"]
        );
    }

    #[test]
    fn summary_respects_char_limit() {
        let agent = PdfAgent::new(
            Arc::new(FixedExtractor(Err("unused"))),
            Arc::new(ComplianceMatcher::with_defaults()),
            3,
            20,
        );
        let record = run(&agent, RawInput::text("A fairly long opening line for the report"));
        assert_eq!(record.summary.chars().count(), 20);
        assert!(record.summary.ends_with("..."));
    }
}
