//! Action router.
//!
//! An ordered list of rules. Each rule is a conjunction of conditions over
//! the classification and the extraction record; the first rule whose
//! conditions all hold decides the action. Nothing matching falls through to
//! a manual review task.

use rust_decimal::Decimal;
use tracing::debug;

use crate::pipeline::types::{
    ActionDecision, ActionStatus, ActionType, ClassificationResult, DocumentFormat,
    ExtractionRecord, ExtractionStatus, Intent, UnclassifiedReason,
};

/// One predicate over (classification, record).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    FormatIs(DocumentFormat),
    IntentIs(Intent),
    /// The record is `Unclassified` for this reason.
    RecordUnclassified(UnclassifiedReason),
    /// The record is a JSON record whose status is one of these.
    JsonStatusIn(Vec<ExtractionStatus>),
    /// The record is a JSON record with at least one anomaly.
    HasAnomalies,
    /// JSON `total_amount` is present and strictly above the value.
    AmountAbove(Decimal),
    /// JSON `total_amount` is absent or at most the value.
    AmountAtMost(Decimal),
    /// The record is a PDF record with at least one compliance flag set.
    AnyComplianceFlag,
    Always,
}

impl Condition {
    fn holds(&self, classification: &ClassificationResult, record: &ExtractionRecord) -> bool {
        match self {
            Self::FormatIs(format) => classification.format == *format,
            Self::IntentIs(intent) => classification.intent == *intent,
            Self::RecordUnclassified(reason) => {
                matches!(record, ExtractionRecord::Unclassified(u) if u.status == *reason)
            }
            Self::JsonStatusIn(statuses) => {
                matches!(record, ExtractionRecord::Json(j) if statuses.contains(&j.status))
            }
            Self::HasAnomalies => {
                matches!(record, ExtractionRecord::Json(j) if !j.anomalies.is_empty())
            }
            Self::AmountAbove(threshold) => match record {
                ExtractionRecord::Json(j) => j.total_amount.is_some_and(|a| a > *threshold),
                _ => false,
            },
            Self::AmountAtMost(threshold) => match record {
                ExtractionRecord::Json(j) => j.total_amount.is_none_or(|a| a <= *threshold),
                _ => false,
            },
            Self::AnyComplianceFlag => match record {
                ExtractionRecord::Pdf(p) => p.regulatory_compliance_flags.any(),
                _ => false,
            },
            Self::Always => true,
        }
    }
}

/// A routing rule: all conditions must hold.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Short name, echoed in the decision's rationale.
    pub name: String,
    pub conditions: Vec<Condition>,
    pub action: ActionType,
    pub status: ActionStatus,
}

impl RoutingRule {
    pub fn new(
        name: impl Into<String>,
        conditions: Vec<Condition>,
        action: ActionType,
        status: ActionStatus,
    ) -> Self {
        Self {
            name: name.into(),
            conditions,
            action,
            status,
        }
    }

    fn matches(&self, classification: &ClassificationResult, record: &ExtractionRecord) -> bool {
        self.conditions.iter().all(|c| c.holds(classification, record))
    }
}

/// Deterministic, first-match-wins rule table.
pub struct ActionRouter {
    rules: Vec<RoutingRule>,
}

impl ActionRouter {
    /// The standard rule table. `threshold` splits high-value JSON documents
    /// from ones that are simply logged.
    pub fn default_rules(threshold: Decimal) -> Self {
        use Condition::*;

        let rules = vec![
            RoutingRule::new(
                "unrecognized format",
                vec![FormatIs(DocumentFormat::Other)],
                ActionType::InputClassificationRequired,
                ActionStatus::PendingClassification,
            ),
            RoutingRule::new(
                "extraction agent fault",
                vec![RecordUnclassified(UnclassifiedReason::AgentFault)],
                ActionType::ManualReviewTask,
                ActionStatus::Error,
            ),
            RoutingRule::new(
                "email request for quote",
                vec![FormatIs(DocumentFormat::Email), IntentIs(Intent::Rfq)],
                ActionType::EscalateToCrm,
                ActionStatus::Success,
            ),
            RoutingRule::new(
                "email needs review",
                vec![FormatIs(DocumentFormat::Email)],
                ActionType::ManualReviewTask,
                ActionStatus::PendingReview,
            ),
            RoutingRule::new(
                "json fraud risk",
                vec![FormatIs(DocumentFormat::Json), IntentIs(Intent::FraudRisk)],
                ActionType::EscalateFraudAlert,
                ActionStatus::PendingReview,
            ),
            RoutingRule::new(
                "json unreadable or unrecognized shape",
                vec![
                    FormatIs(DocumentFormat::Json),
                    JsonStatusIn(vec![
                        ExtractionStatus::MalformedInput,
                        ExtractionStatus::SchemaMismatch,
                    ]),
                ],
                ActionType::ManualReviewTask,
                ActionStatus::PendingReview,
            ),
            RoutingRule::new(
                "json with data anomalies",
                vec![FormatIs(DocumentFormat::Json), HasAnomalies],
                ActionType::ManualReviewTask,
                ActionStatus::PendingReview,
            ),
            RoutingRule::new(
                format!("json total above {threshold}"),
                vec![FormatIs(DocumentFormat::Json), AmountAbove(threshold)],
                ActionType::ReviewHighValueInvoice,
                ActionStatus::PendingReview,
            ),
            RoutingRule::new(
                format!("json total at most {threshold}"),
                vec![FormatIs(DocumentFormat::Json), AmountAtMost(threshold)],
                ActionType::LogTransaction,
                ActionStatus::Success,
            ),
            RoutingRule::new(
                "pdf with compliance flags",
                vec![FormatIs(DocumentFormat::Pdf), AnyComplianceFlag],
                ActionType::FlagComplianceDocument,
                ActionStatus::Success,
            ),
            RoutingRule::new(
                "pdf without compliance flags",
                vec![FormatIs(DocumentFormat::Pdf)],
                ActionType::LogDocument,
                ActionStatus::Success,
            ),
        ];

        Self { rules }
    }

    /// Router with no rules; everything falls back to manual review.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule after the existing ones.
    pub fn add_rule(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// Decide the follow-up action. Always returns a decision.
    pub fn route(
        &self,
        classification: &ClassificationResult,
        record: &ExtractionRecord,
    ) -> ActionDecision {
        for rule in &self.rules {
            if rule.matches(classification, record) {
                debug!(rule = %rule.name, action = rule.action.label(), "Routing rule matched");
                return ActionDecision {
                    action_type: rule.action,
                    status: rule.status,
                    rationale: Some(format!("Matched rule: {}", rule.name)),
                };
            }
        }

        debug!(format = %classification.format, "No routing rule matched, using fallback");
        ActionDecision {
            action_type: ActionType::ManualReviewTask,
            status: ActionStatus::PendingReview,
            rationale: Some(format!(
                "No rule matched format '{}' with intent '{}'",
                classification.format, classification.intent
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::pipeline::types::{
        ComplianceFlags, EmailRecord, JsonRecord, PdfDocumentType, PdfRecord, Tone, Urgency,
    };

    fn classification(format: DocumentFormat, intent: Intent) -> ClassificationResult {
        ClassificationResult {
            format,
            intent,
            confidence: Some(0.9),
        }
    }

    fn json_record(status: ExtractionStatus, amount: Option<Decimal>) -> ExtractionRecord {
        ExtractionRecord::Json(JsonRecord {
            status,
            document_id: Some("INV-1".into()),
            document_type: Some("invoice".into()),
            total_amount: amount,
            currency: Some("USD".into()),
            line_items: Vec::new(),
            counterparties: Vec::new(),
            missing_fields: Vec::new(),
            anomalies: Vec::new(),
            detail: None,
        })
    }

    fn email_record() -> ExtractionRecord {
        ExtractionRecord::Email(EmailRecord {
            sender_name: None,
            sender_email: Some("a@b.example".into()),
            subject: Some("Quote".into()),
            date: None,
            issue_summary: String::new(),
            urgency: Urgency::Low,
            tone: Tone::Neutral,
            status: ExtractionStatus::Partial,
            missing_fields: vec!["sender_name".into(), "date".into()],
        })
    }

    fn pdf_record(flagged: bool) -> ExtractionRecord {
        let mut flags = ComplianceFlags::default();
        flags.flags.insert("contains_gdpr_keywords".into(), flagged);
        ExtractionRecord::Pdf(PdfRecord {
            status: ExtractionStatus::Complete,
            title: Some("Doc".into()),
            summary: "Doc".into(),
            document_type: PdfDocumentType::Other,
            regulatory_compliance_flags: flags,
            text_length: 3,
        })
    }

    fn router() -> ActionRouter {
        ActionRouter::default_rules(dec!(10000))
    }

    #[test]
    fn other_format_needs_classification() {
        let c = ClassificationResult::unrecognized();
        let decision = router().route(&c, &ExtractionRecord::not_applicable(&c));
        assert_eq!(decision.action_type, ActionType::InputClassificationRequired);
        assert_eq!(decision.status, ActionStatus::PendingClassification);
    }

    #[test]
    fn email_routes_by_intent() {
        let rfq = router().route(&classification(DocumentFormat::Email, Intent::Rfq), &email_record());
        assert_eq!(rfq.action_type, ActionType::EscalateToCrm);
        assert_eq!(rfq.status, ActionStatus::Success);

        let complaint = router().route(
            &classification(DocumentFormat::Email, Intent::Complaint),
            &email_record(),
        );
        assert_eq!(complaint.action_type, ActionType::ManualReviewTask);
        assert_eq!(complaint.status, ActionStatus::PendingReview);
    }

    #[test]
    fn json_threshold_is_strict() {
        let c = classification(DocumentFormat::Json, Intent::Invoice);
        let at = router().route(&c, &json_record(ExtractionStatus::Complete, Some(dec!(10000))));
        assert_eq!(at.action_type, ActionType::LogTransaction);
        assert_eq!(at.status, ActionStatus::Success);

        let above = router().route(&c, &json_record(ExtractionStatus::Complete, Some(dec!(10000.01))));
        assert_eq!(above.action_type, ActionType::ReviewHighValueInvoice);
        assert_eq!(above.status, ActionStatus::PendingReview);
    }

    #[test]
    fn json_missing_amount_is_logged() {
        let c = classification(DocumentFormat::Json, Intent::Invoice);
        let decision = router().route(&c, &json_record(ExtractionStatus::Partial, None));
        assert_eq!(decision.action_type, ActionType::LogTransaction);
    }

    #[test]
    fn json_schema_mismatch_goes_to_review() {
        let c = classification(DocumentFormat::Json, Intent::Other);
        let decision = router().route(&c, &json_record(ExtractionStatus::SchemaMismatch, None));
        assert_eq!(decision.action_type, ActionType::ManualReviewTask);
        assert_eq!(decision.status, ActionStatus::PendingReview);
    }

    #[test]
    fn json_anomalies_go_to_review() {
        let c = classification(DocumentFormat::Json, Intent::Invoice);
        let mut record = json_record(ExtractionStatus::Complete, Some(dec!(-5000)));
        if let ExtractionRecord::Json(j) = &mut record {
            j.anomalies.push("total_amount is negative (-5000)".into());
        }
        let decision = router().route(&c, &record);
        assert_eq!(decision.action_type, ActionType::ManualReviewTask);
        assert_eq!(decision.status, ActionStatus::PendingReview);
        assert_eq!(
            decision.rationale.as_deref(),
            Some("Matched rule: json with data anomalies")
        );
    }

    #[test]
    fn json_fraud_precedes_threshold() {
        let c = classification(DocumentFormat::Json, Intent::FraudRisk);
        let decision = router().route(&c, &json_record(ExtractionStatus::Partial, Some(dec!(50))));
        assert_eq!(decision.action_type, ActionType::EscalateFraudAlert);
    }

    #[test]
    fn pdf_flags_decide_action() {
        let c = classification(DocumentFormat::Pdf, Intent::Regulation);
        let flagged = router().route(&c, &pdf_record(true));
        assert_eq!(flagged.action_type, ActionType::FlagComplianceDocument);
        assert_eq!(flagged.status, ActionStatus::Success);

        let plain = router().route(&c, &pdf_record(false));
        assert_eq!(plain.action_type, ActionType::LogDocument);
        assert_eq!(plain.status, ActionStatus::Success);
    }

    #[test]
    fn agent_fault_is_an_error_decision() {
        let c = classification(DocumentFormat::Pdf, Intent::Other);
        let record = ExtractionRecord::agent_fault(&c, "boom");
        let decision = router().route(&c, &record);
        assert_eq!(decision.action_type, ActionType::ManualReviewTask);
        assert_eq!(decision.status, ActionStatus::Error);
    }

    #[test]
    fn unmatched_falls_back_to_review() {
        let c = classification(DocumentFormat::Email, Intent::Rfq);
        let decision = ActionRouter::empty().route(&c, &email_record());
        assert_eq!(decision.action_type, ActionType::ManualReviewTask);
        assert_eq!(decision.status, ActionStatus::PendingReview);
        assert!(decision.rationale.unwrap().contains("No rule matched"));
    }

    #[test]
    fn first_match_wins() {
        let mut router = ActionRouter::empty();
        router.add_rule(RoutingRule::new(
            "catch all",
            vec![Condition::Always],
            ActionType::LogDocument,
            ActionStatus::Success,
        ));
        router.add_rule(RoutingRule::new(
            "never reached",
            vec![Condition::FormatIs(DocumentFormat::Email)],
            ActionType::EscalateToCrm,
            ActionStatus::Success,
        ));
        let decision = router.route(&classification(DocumentFormat::Email, Intent::Rfq), &email_record());
        assert_eq!(decision.action_type, ActionType::LogDocument);
        assert_eq!(decision.rationale.as_deref(), Some("Matched rule: catch all"));
    }
}
