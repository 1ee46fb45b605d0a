//! Format and intent classifier.
//!
//! Structural signals decide the format first (declared extension, PDF magic
//! bytes, JSON parse, email header lines); content heuristics only run on
//! what is left. Intent comes from per-format keyword and key-name signals.
//! Pure: the same bytes always classify the same way.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::agents::compliance::ComplianceMatcher;
use crate::agents::json::normalize_key;
use crate::pipeline::types::{ClassificationResult, DocumentFormat, Intent, MediaKind, RawInput};

const CONFIDENCE_DECLARED: f32 = 0.95;
const CONFIDENCE_JSON: f32 = 0.9;
const CONFIDENCE_EMAIL: f32 = 0.8;
const CONFIDENCE_DOCUMENT: f32 = 0.6;

/// Email headers only count near the top of the text.
const HEADER_SCAN_LINES: usize = 10;

static EMAIL_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(from|subject)\s*:\s*\S").unwrap());

static DOC_STRUCTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(chapter|section|article|part|appendix)\s+([0-9]+|[ivxlc]+|[a-z])\b")
        .unwrap()
});

static DOC_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(invoice (number|no\.?|#)|amount due|bill to|terms and conditions|privacy policy|pursuant to|hereinafter|data protection|compliance (report|policy|requirements))\b",
    )
    .unwrap()
});

static RFQ_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(rfq|request for (a )?quot(e|ation)|quot(e|ation) request|price quote|send (us|me) (a )?quote|quote for|pricing for)\b",
    )
    .unwrap()
});

static FRAUD_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fraud(ulent)?|phishing|unauthori[sz]ed (transaction|charge|access|login)s?|suspicious (activity|transaction|login)s?|identity theft|scam)\b",
    )
    .unwrap()
});

static COMPLAINT_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(complain(t|ts|ing|ed)?|unacceptable|dissatisfied|disappointed|refund|broken|damaged|defective|not working|poor service|terrible)\b",
    )
    .unwrap()
});

static INVOICE_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(invoices?|billing|payment (due|reminder|overdue)|amount due|receipt)\b")
        .unwrap()
});

static REGULATION_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(regulat(ion|ions|ory)|compliance|audit|legislation|directive)\b").unwrap()
});

const JSON_FRAUD_KEYS: &[&str] = &[
    "ip",
    "ipaddress",
    "deviceid",
    "devicefingerprint",
    "country",
    "geolocation",
    "location",
    "loginattempts",
    "failedlogins",
    "failedloginattempts",
    "accountagedays",
    "riskscore",
    "fraudscore",
    "velocity",
    "chargeback",
    "cardbin",
];
const JSON_INVOICE_KEYS: &[&str] = &["grandtotal", "amountdue", "totaldue", "balancedue"];
const JSON_RFQ_KEYS: &[&str] = &["rfq", "rfqid", "quoterequest", "requestforquote", "quoteid"];
const JSON_COMPLAINT_KEYS: &[&str] = &["complaint", "complaintid", "grievance"];
const JSON_REGULATION_KEYS: &[&str] = &["regulation", "regulations", "compliance", "regulatoryframework"];
const JSON_TYPE_KEYS: &[&str] = &["documenttype", "doctype", "type", "kind", "category"];

/// Emits a (format, intent) label for any input. Never fails.
pub struct Classifier {
    compliance: Arc<ComplianceMatcher>,
}

impl Classifier {
    pub fn new(compliance: Arc<ComplianceMatcher>) -> Self {
        Self { compliance }
    }

    pub fn classify(&self, input: &RawInput) -> ClassificationResult {
        let text = input.as_text();
        let result = self.detect(input, &text);
        debug!(
            format = %result.format,
            intent = %result.intent,
            confidence = result.confidence.unwrap_or_default(),
            "Input classified"
        );
        result
    }

    fn detect(&self, input: &RawInput, text: &str) -> ClassificationResult {
        let declared = match input.media_kind() {
            MediaKind::Pdf => Some(DocumentFormat::Pdf),
            MediaKind::Json => Some(DocumentFormat::Json),
            MediaKind::Email => Some(DocumentFormat::Email),
            MediaKind::Text | MediaKind::Unknown => None,
        };
        if let Some(format) = declared {
            return self.labelled(format, text, CONFIDENCE_DECLARED);
        }

        if input.is_pdf_binary() {
            return self.labelled(DocumentFormat::Pdf, text, CONFIDENCE_DECLARED);
        }

        if parse_structured(text).is_some() {
            return self.labelled(DocumentFormat::Json, text, CONFIDENCE_JSON);
        }

        if looks_like_email(text) {
            return self.labelled(DocumentFormat::Email, text, CONFIDENCE_EMAIL);
        }

        if self.looks_like_document(text) {
            return self.labelled(DocumentFormat::Pdf, text, CONFIDENCE_DOCUMENT);
        }

        ClassificationResult::unrecognized()
    }

    fn labelled(&self, format: DocumentFormat, text: &str, confidence: f32) -> ClassificationResult {
        let intent = match format {
            DocumentFormat::Email => self.email_intent(text),
            DocumentFormat::Json => json_intent(text),
            DocumentFormat::Pdf => self.document_intent(text),
            DocumentFormat::Other => Intent::Other,
        };
        ClassificationResult {
            format,
            intent,
            confidence: Some(confidence),
        }
    }

    fn looks_like_document(&self, text: &str) -> bool {
        DOC_STRUCTURE.is_match(text)
            || DOC_VOCABULARY.is_match(text)
            || self.compliance.mentions_any(text)
    }

    fn email_intent(&self, text: &str) -> Intent {
        if RFQ_SIGNAL.is_match(text) {
            Intent::Rfq
        } else if FRAUD_SIGNAL.is_match(text) {
            Intent::FraudRisk
        } else if COMPLAINT_SIGNAL.is_match(text) {
            Intent::Complaint
        } else if INVOICE_SIGNAL.is_match(text) {
            Intent::Invoice
        } else if REGULATION_SIGNAL.is_match(text) || self.compliance.mentions_any(text) {
            Intent::Regulation
        } else {
            Intent::Other
        }
    }

    fn document_intent(&self, text: &str) -> Intent {
        if self.compliance.mentions_any(text) || REGULATION_SIGNAL.is_match(text) {
            Intent::Regulation
        } else if INVOICE_SIGNAL.is_match(text) {
            Intent::Invoice
        } else {
            Intent::Other
        }
    }
}

/// Parse `text` as a JSON object or array.
fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with(['{', '[']) {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

fn looks_like_email(text: &str) -> bool {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .take(HEADER_SCAN_LINES)
        .any(|l| EMAIL_HEADER.is_match(l))
}

fn json_intent(text: &str) -> Intent {
    let Some(value) = parse_structured(text) else {
        return Intent::Other;
    };

    let mut keys = BTreeSet::new();
    let mut type_values = Vec::new();
    collect_keys(&value, &mut keys, &mut type_values);

    for type_value in &type_values {
        if type_value.contains("invoice") {
            return Intent::Invoice;
        }
        if type_value.contains("fraud") {
            return Intent::FraudRisk;
        }
        if type_value.contains("rfq") || type_value.contains("quote") {
            return Intent::Rfq;
        }
        if type_value.contains("complaint") {
            return Intent::Complaint;
        }
        if type_value.contains("regulation") || type_value.contains("compliance") {
            return Intent::Regulation;
        }
    }

    let has_any = |set: &[&str]| set.iter().any(|k| keys.contains(*k));

    if keys.iter().any(|k| k.starts_with("invoice")) || has_any(JSON_INVOICE_KEYS) {
        return Intent::Invoice;
    }
    let fraud_signals = JSON_FRAUD_KEYS.iter().filter(|k| keys.contains(**k)).count();
    if fraud_signals >= 2 || keys.iter().any(|k| k.contains("fraud")) {
        return Intent::FraudRisk;
    }
    if has_any(JSON_RFQ_KEYS) {
        return Intent::Rfq;
    }
    if has_any(JSON_COMPLAINT_KEYS) {
        return Intent::Complaint;
    }
    if has_any(JSON_REGULATION_KEYS) {
        return Intent::Regulation;
    }
    Intent::Other
}

/// Every normalized key at any depth, plus lowercased values of type-like keys.
fn collect_keys(value: &Value, keys: &mut BTreeSet<String>, type_values: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let normalized = normalize_key(key);
                if JSON_TYPE_KEYS.contains(&normalized.as_str())
                    && let Some(s) = child.as_str()
                {
                    type_values.push(s.to_lowercase());
                }
                keys.insert(normalized);
                collect_keys(child, keys, type_values);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, keys, type_values);
            }
        }
        _ => {}
    }
}
