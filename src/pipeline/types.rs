//! Shared types for the intake pipeline.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Leading bytes of every PDF file.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Characters of raw input kept on the persisted context for display.
const PREVIEW_CHARS: usize = 200;

// ── Raw input ───────────────────────────────────────────────────────

/// Media kind declared by the caller (file extension) or absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Pdf,
    Json,
    Email,
    Text,
    Unknown,
}

impl MediaKind {
    /// Map a filename's extension to a media kind.
    pub fn from_filename(filename: &str) -> Self {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return Self::Unknown;
        };
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "json" => Self::Json,
            "eml" | "msg" => Self::Email,
            "txt" | "text" => Self::Text,
            _ => Self::Unknown,
        }
    }
}

/// Where an input entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    ApiTextInput,
    ApiFileUpload,
}

/// An input document as received. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct RawInput {
    payload: Vec<u8>,
    media_kind: MediaKind,
    filename: Option<String>,
    source: InputSource,
}

impl RawInput {
    /// Free text submitted without a file.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            payload: content.into().into_bytes(),
            media_kind: MediaKind::Unknown,
            filename: None,
            source: InputSource::ApiTextInput,
        }
    }

    /// An uploaded file; the media kind comes from the filename extension.
    pub fn file(filename: impl Into<String>, payload: Vec<u8>) -> Self {
        let filename = filename.into();
        Self {
            media_kind: MediaKind::from_filename(&filename),
            payload,
            filename: Some(filename),
            source: InputSource::ApiFileUpload,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn source(&self) -> InputSource {
        self.source
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced.
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Whether the payload is a binary PDF (as opposed to already-extracted text).
    pub fn is_pdf_binary(&self) -> bool {
        self.payload.starts_with(PDF_MAGIC)
    }

    /// Replace the payload with text extracted from it. The result is a PDF
    /// whatever extension the upload carried.
    pub fn into_extracted_pdf(self, text: String) -> Self {
        Self {
            payload: text.into_bytes(),
            media_kind: MediaKind::Pdf,
            filename: self.filename,
            source: self.source,
        }
    }

    /// Reference stored on the conversation context instead of the full payload.
    pub fn to_ref(&self) -> RawInputRef {
        let preview = if self.is_pdf_binary() {
            String::new()
        } else {
            self.as_text().chars().take(PREVIEW_CHARS).collect()
        };
        RawInputRef {
            source: self.source,
            filename: self.filename.clone(),
            media_kind: self.media_kind,
            byte_len: self.payload.len(),
            preview,
        }
    }
}

/// Persisted pointer to the raw input of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInputRef {
    pub source: InputSource,
    pub filename: Option<String>,
    pub media_kind: MediaKind,
    pub byte_len: usize,
    /// First characters of a text payload. Empty for binary PDFs.
    pub preview: String,
}

// ── Classification ──────────────────────────────────────────────────

/// Structural format of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Email,
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "PDF")]
    Pdf,
    Other,
}

impl DocumentFormat {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Json => "JSON",
            Self::Pdf => "PDF",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Business intent inferred from content signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "RFQ")]
    Rfq,
    Complaint,
    Invoice,
    Regulation,
    #[serde(rename = "Fraud Risk")]
    FraudRisk,
    Other,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rfq => "RFQ",
            Self::Complaint => "Complaint",
            Self::Invoice => "Invoice",
            Self::Regulation => "Regulation",
            Self::FraudRisk => "Fraud Risk",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier output. Produced once per input and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub format: DocumentFormat,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ClassificationResult {
    /// Result for input nothing recognizes.
    pub fn unrecognized() -> Self {
        Self {
            format: DocumentFormat::Other,
            intent: Intent::Other,
            confidence: Some(0.0),
        }
    }
}

// ── Extraction records ──────────────────────────────────────────────

/// Completeness marker carried on every format-specific record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStatus {
    /// Every field the agent looks for was found.
    Complete,
    /// Best-effort extraction; see `missing_fields`.
    Partial,
    /// The payload could not be read as its declared format.
    MalformedInput,
    /// Well-formed, but none of the expected keys were present.
    SchemaMismatch,
}

/// Urgency derived from an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    High,
    Medium,
    Low,
}

/// Tone derived from an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tone {
    Escalation,
    Threatening,
    Question,
    Polite,
    Informative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub subject: Option<String>,
    /// RFC 3339 when the Date header parsed, otherwise the raw header value.
    pub date: Option<String>,
    pub issue_summary: String,
    pub urgency: Urgency,
    pub tone: Tone,
    pub status: ExtractionStatus,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub quantity: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub unit_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total: Option<Decimal>,
}

/// A party named in a structured document (customer, vendor, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub role: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub status: ExtractionStatus,
    pub document_id: Option<String>,
    pub document_type: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub counterparties: Vec<Counterparty>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub anomalies: Vec<String>,
    /// Parser message when `status` is `MalformedInput` or `SchemaMismatch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Coarse document class assigned by the PDF agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfDocumentType {
    Invoice,
    Policy,
    Report,
    Other,
}

/// Per-regulation booleans (`contains_gdpr_keywords`, ...) plus the names that matched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceFlags {
    #[serde(flatten)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
}

impl ComplianceFlags {
    /// True if any regulation matched.
    pub fn any(&self) -> bool {
        self.flags.values().any(|v| *v)
    }

    /// Look up a flag by its full key, e.g. `contains_hipaa_keywords`.
    pub fn get(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfRecord {
    pub status: ExtractionStatus,
    pub title: Option<String>,
    pub summary: String,
    pub document_type: PdfDocumentType,
    pub regulatory_compliance_flags: ComplianceFlags,
    /// Characters of text the agent worked from.
    pub text_length: usize,
}

/// Why no format-specific record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnclassifiedReason {
    #[serde(rename = "No_Specific_Agent_Applicable")]
    NoSpecificAgentApplicable,
    #[serde(rename = "Agent_Fault")]
    AgentFault,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnclassifiedRecord {
    pub status: UnclassifiedReason,
    pub message: String,
    pub classified_format: DocumentFormat,
    pub classified_intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Exactly one record is produced per input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type")]
pub enum ExtractionRecord {
    #[serde(rename = "EmailRecord")]
    Email(EmailRecord),
    #[serde(rename = "JSONRecord")]
    Json(JsonRecord),
    #[serde(rename = "PDFRecord")]
    Pdf(PdfRecord),
    Unclassified(UnclassifiedRecord),
}

impl ExtractionRecord {
    /// Record for input no agent handles.
    pub fn not_applicable(classification: &ClassificationResult) -> Self {
        Self::Unclassified(UnclassifiedRecord {
            status: UnclassifiedReason::NoSpecificAgentApplicable,
            message: format!(
                "No specific agent is applicable to format '{}'.",
                classification.format
            ),
            classified_format: classification.format,
            classified_intent: classification.intent,
            fault: None,
        })
    }

    /// Record replacing the output of an agent that faulted.
    pub fn agent_fault(classification: &ClassificationResult, fault: impl Into<String>) -> Self {
        Self::Unclassified(UnclassifiedRecord {
            status: UnclassifiedReason::AgentFault,
            message: "Extraction agent failed; the input needs manual handling.".into(),
            classified_format: classification.format,
            classified_intent: classification.intent,
            fault: Some(fault.into()),
        })
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email(_) => "email",
            Self::Json(_) => "json",
            Self::Pdf(_) => "pdf",
            Self::Unclassified(_) => "unclassified",
        }
    }
}

// ── Action decision ─────────────────────────────────────────────────

/// Follow-up action proposed by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "Input Classification Required")]
    InputClassificationRequired,
    #[serde(rename = "Escalate to CRM")]
    EscalateToCrm,
    #[serde(rename = "Manual Review Task")]
    ManualReviewTask,
    #[serde(rename = "Escalate Fraud Alert")]
    EscalateFraudAlert,
    #[serde(rename = "Review High Value Invoice")]
    ReviewHighValueInvoice,
    #[serde(rename = "Log Transaction")]
    LogTransaction,
    #[serde(rename = "Flag Compliance Document")]
    FlagComplianceDocument,
    #[serde(rename = "Log Document")]
    LogDocument,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InputClassificationRequired => "Input Classification Required",
            Self::EscalateToCrm => "Escalate to CRM",
            Self::ManualReviewTask => "Manual Review Task",
            Self::EscalateFraudAlert => "Escalate Fraud Alert",
            Self::ReviewHighValueInvoice => "Review High Value Invoice",
            Self::LogTransaction => "Log Transaction",
            Self::FlagComplianceDocument => "Flag Compliance Document",
            Self::LogDocument => "Log Document",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    PendingReview,
    PendingClassification,
    Error,
}

impl ActionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PendingReview => "pending_review",
            Self::PendingClassification => "pending_classification",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action_type: ActionType,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

// ── Conversation context ────────────────────────────────────────────

/// The unit written to the context store, once per pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: Uuid,
    pub raw_input_ref: RawInputRef,
    pub classification: ClassificationResult,
    pub extraction: ExtractionRecord,
    pub action: ActionDecision,
    pub created_at: DateTime<Utc>,
}

/// Envelope returned to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub conversation_id: Uuid,
    pub classification: ClassificationResult,
    pub extraction: ExtractionRecord,
    pub action: ActionDecision,
    /// Mirrors `action.status`.
    pub status: ActionStatus,
}

impl From<ConversationContext> for PipelineResponse {
    fn from(ctx: ConversationContext) -> Self {
        Self {
            conversation_id: ctx.id,
            status: ctx.action.status,
            classification: ctx.classification,
            extraction: ctx.extraction,
            action: ctx.action,
        }
    }
}
