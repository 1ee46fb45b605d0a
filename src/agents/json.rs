//! JSON extraction agent.
//!
//! Business payloads arrive in many shapes (`grandTotal` vs `total_amount`,
//! `items` vs `lineItems`, fields wrapped in an `invoice` object). Keys are
//! normalized (lowercase, no `_`/`-`/space) and matched against alias lists,
//! searching wrapper objects breadth-first so top-level keys win.

use std::collections::VecDeque;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::{Map, Value};

use crate::agents::ExtractionAgent;
use crate::error::AgentFault;
use crate::pipeline::types::{
    ClassificationResult, Counterparty, DocumentFormat, ExtractionRecord, ExtractionStatus,
    Intent, JsonRecord, LineItem, RawInput,
};

const ID_KEYS: &[&str] = &[
    "documentid",
    "docid",
    "invoiceid",
    "invoicenumber",
    "invoiceno",
    "orderid",
    "ordernumber",
    "transactionid",
    "txnid",
    "referencenumber",
    "reference",
    "id",
];
const TYPE_KEYS: &[&str] = &["documenttype", "doctype", "type", "kind", "category"];
const AMOUNT_KEYS: &[&str] = &[
    "grandtotal",
    "totalamount",
    "total",
    "amounttotal",
    "totaldue",
    "amountdue",
    "balancedue",
    "amount",
    "amountusd",
];
const CURRENCY_KEYS: &[&str] = &["currency", "currencycode", "curr", "currencyiso"];
const LINE_ITEM_KEYS: &[&str] = &["lineitems", "items", "lines", "products", "orderlines", "entries"];
const COUNTERPARTY_KEYS: &[&str] = &[
    "customer",
    "client",
    "buyer",
    "billto",
    "shipto",
    "seller",
    "vendor",
    "supplier",
    "merchant",
    "sender",
    "recipient",
    "payer",
    "payee",
];

const ITEM_DESCRIPTION_KEYS: &[&str] = &["description", "desc", "name", "item", "product", "title", "sku"];
const ITEM_QUANTITY_KEYS: &[&str] = &["quantity", "qty", "count", "units"];
const ITEM_PRICE_KEYS: &[&str] = &["unitprice", "price", "rate", "unitcost", "cost"];
const ITEM_TOTAL_KEYS: &[&str] = &["total", "linetotal", "amount", "subtotal", "extendedprice"];

const PARTY_NAME_KEYS: &[&str] = &["name", "companyname", "company", "fullname", "contactname"];
const PARTY_EMAIL_KEYS: &[&str] = &["email", "emailaddress", "contactemail"];

/// Tolerance when comparing a stated total against a computed one.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Normalizes structured JSON payloads into a [`JsonRecord`].
#[derive(Debug, Default)]
pub struct JsonAgent;

impl JsonAgent {
    pub fn new() -> Self {
        Self
    }

    fn extract(&self, text: &str, intent: Intent) -> JsonRecord {
        if text.trim().is_empty() {
            return malformed("payload is empty");
        }
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return malformed(&format!("invalid JSON: {e}")),
        };

        let roots: Vec<&Map<String, Value>> = match &value {
            Value::Object(map) => vec![map],
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            _ => Vec::new(),
        };
        if roots.is_empty() {
            let mut record = empty_record(ExtractionStatus::SchemaMismatch);
            record.detail = Some("top-level value is not an object".into());
            record.missing_fields = required_fields();
            return record;
        }

        let mut anomalies = Vec::new();

        let id_hit = find_alias(&roots, ID_KEYS);
        let document_id = id_hit.as_ref().and_then(|(_, v)| scalar_string(v));

        let explicit_type = find_alias(&roots, TYPE_KEYS)
            .and_then(|(_, v)| scalar_string(v))
            .map(|t| t.to_lowercase());
        let document_type = explicit_type
            .clone()
            .or_else(|| infer_type(id_hit.map(|(k, _)| k), intent));

        let (total_amount, amount_currency) = find_alias(&roots, AMOUNT_KEYS)
            .map(|(_, v)| parse_amount(v))
            .unwrap_or((None, None));

        let currency = find_alias(&roots, CURRENCY_KEYS)
            .and_then(|(_, v)| scalar_string(v))
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .or(amount_currency);

        if let Some(total) = total_amount {
            if total.is_sign_negative() && !total.is_zero() {
                anomalies.push(format!("total_amount is negative ({total})"));
            }
            if currency.is_none() {
                anomalies.push("total_amount present without a currency".to_string());
            }
        }

        let line_items = find_alias(&roots, LINE_ITEM_KEYS)
            .and_then(|(_, v)| v.as_array())
            .map(|items| parse_line_items(items, &mut anomalies))
            .unwrap_or_default();

        if let Some(total) = total_amount
            && !line_items.is_empty()
            && line_items.iter().all(|i| i.total.is_some())
        {
            let sum = line_items
                .iter()
                .filter_map(|i| i.total)
                .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t));
            match sum.and_then(|sum| sum.checked_sub(total).map(|diff| (sum, diff))) {
                Some((sum, diff)) if diff.abs() > AMOUNT_TOLERANCE => anomalies.push(format!(
                    "line items sum to {sum} but total_amount is {total}"
                )),
                Some(_) => {}
                None => anomalies.push("line items sum: amount overflow".to_string()),
            }
        }

        let counterparties = find_counterparties(&roots);

        let mut missing_fields = Vec::new();
        if document_id.is_none() {
            missing_fields.push("document_id".to_string());
        }
        if document_type.is_none() {
            missing_fields.push("document_type".to_string());
        }
        if total_amount.is_none() {
            missing_fields.push("total_amount".to_string());
        }

        let none_present = document_id.is_none() && explicit_type.is_none() && total_amount.is_none();
        let (status, detail) = if none_present {
            (
                ExtractionStatus::SchemaMismatch,
                Some("none of document_id, document_type, total_amount were found".to_string()),
            )
        } else if missing_fields.is_empty() {
            (ExtractionStatus::Complete, None)
        } else {
            (ExtractionStatus::Partial, None)
        };

        JsonRecord {
            status,
            document_id,
            document_type,
            total_amount,
            currency,
            line_items,
            counterparties,
            missing_fields,
            anomalies,
            detail,
        }
    }
}

impl ExtractionAgent for JsonAgent {
    fn name(&self) -> &str {
        "json_agent"
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn process(
        &self,
        input: &RawInput,
        classification: &ClassificationResult,
    ) -> Result<ExtractionRecord, AgentFault> {
        let text = input.as_text();
        Ok(ExtractionRecord::Json(self.extract(&text, classification.intent)))
    }
}

fn required_fields() -> Vec<String> {
    vec![
        "document_id".to_string(),
        "document_type".to_string(),
        "total_amount".to_string(),
    ]
}

fn empty_record(status: ExtractionStatus) -> JsonRecord {
    JsonRecord {
        status,
        document_id: None,
        document_type: None,
        total_amount: None,
        currency: None,
        line_items: Vec::new(),
        counterparties: Vec::new(),
        missing_fields: Vec::new(),
        anomalies: Vec::new(),
        detail: None,
    }
}

fn malformed(detail: &str) -> JsonRecord {
    let mut record = empty_record(ExtractionStatus::MalformedInput);
    record.detail = Some(detail.to_string());
    record.missing_fields = required_fields();
    record
}

/// Lowercase and drop `_`, `-` and spaces, so `grand_total`, `grandTotal`
/// and `Grand Total` compare equal.
pub(crate) fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_subtree_key(normalized: &str) -> bool {
    LINE_ITEM_KEYS.contains(&normalized) || COUNTERPARTY_KEYS.contains(&normalized)
}

/// Breadth-first search for the first non-null value under any alias.
///
/// Within one object, earlier aliases win. Line-item and counterparty
/// subtrees are not descended into. Returns the normalized key that matched.
fn find_alias<'a>(
    roots: &[&'a Map<String, Value>],
    aliases: &[&str],
) -> Option<(String, &'a Value)> {
    let mut queue: VecDeque<&'a Map<String, Value>> = roots.iter().copied().collect();
    while let Some(map) = queue.pop_front() {
        for alias in aliases {
            for (key, value) in map {
                if value.is_null() {
                    continue;
                }
                if normalize_key(key) == *alias {
                    return Some((alias.to_string(), value));
                }
            }
        }
        for (key, value) in map {
            if let Value::Object(child) = value
                && !is_subtree_key(&normalize_key(key))
            {
                queue.push_back(child);
            }
        }
    }
    None
}

fn lookup<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| {
        map.iter()
            .find(|(k, v)| !v.is_null() && normalize_key(k) == *alias)
            .map(|(_, v)| v)
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn infer_type(id_key: Option<String>, intent: Intent) -> Option<String> {
    if let Some(key) = id_key.as_deref() {
        if key.starts_with("invoice") {
            return Some("invoice".into());
        }
        if key.starts_with("order") {
            return Some("order".into());
        }
        if key.starts_with("transaction") || key.starts_with("txn") {
            return Some("transaction".into());
        }
    }
    match intent {
        Intent::Invoice => Some("invoice".into()),
        Intent::Rfq => Some("rfq".into()),
        Intent::Complaint => Some("complaint".into()),
        Intent::Regulation => Some("regulation".into()),
        Intent::FraudRisk => Some("transaction".into()),
        Intent::Other => None,
    }
}

fn decimal_from_number(n: &serde_json::Number) -> Option<Decimal> {
    Decimal::from_str(&n.to_string())
        .ok()
        .or_else(|| n.as_f64().and_then(Decimal::from_f64))
}

/// Parse an amount value, returning any currency it implies.
///
/// Accepts numbers, strings such as `"$1,250.00"` or `"1250 EUR"`, and
/// `{"value": .., "currency": ..}` objects.
fn parse_amount(value: &Value) -> (Option<Decimal>, Option<String>) {
    match value {
        Value::Number(n) => (decimal_from_number(n), None),
        Value::String(s) => parse_amount_str(s),
        Value::Object(map) => {
            let amount = lookup(map, &["value", "amount", "total"]).and_then(|v| parse_amount(v).0);
            let currency = lookup(map, CURRENCY_KEYS)
                .and_then(scalar_string)
                .map(|c| c.to_uppercase());
            (amount, currency)
        }
        _ => (None, None),
    }
}

fn parse_amount_str(raw: &str) -> (Option<Decimal>, Option<String>) {
    let mut currency = None;
    let mut digits = String::new();
    let mut letters = String::new();
    for c in raw.chars() {
        match c {
            '$' => currency = Some("USD".to_string()),
            '€' => currency = Some("EUR".to_string()),
            '£' => currency = Some("GBP".to_string()),
            '¥' => currency = Some("JPY".to_string()),
            ',' | '_' => {}
            c if c.is_whitespace() => {}
            c if c.is_ascii_alphabetic() => letters.push(c),
            c => digits.push(c),
        }
    }
    if letters.len() == 3 {
        currency = Some(letters.to_uppercase());
    }
    (Decimal::from_str(&digits).ok(), currency)
}

fn decimal_field(map: &Map<String, Value>, aliases: &[&str]) -> Option<Decimal> {
    lookup(map, aliases).and_then(|v| parse_amount(v).0)
}

fn parse_line_items(items: &[Value], anomalies: &mut Vec<String>) -> Vec<LineItem> {
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let line = idx + 1;
        let Value::Object(map) = item else {
            out.push(LineItem {
                description: scalar_string(item),
                quantity: None,
                unit_price: None,
                total: None,
            });
            continue;
        };

        let description = lookup(map, ITEM_DESCRIPTION_KEYS).and_then(scalar_string);
        let quantity = decimal_field(map, ITEM_QUANTITY_KEYS);
        let unit_price = decimal_field(map, ITEM_PRICE_KEYS);
        let stated_total = decimal_field(map, ITEM_TOTAL_KEYS);
        let computed = match quantity.zip(unit_price) {
            Some((q, p)) => {
                let product = q.checked_mul(p);
                if product.is_none() {
                    anomalies.push(format!("line item {line}: amount overflow"));
                }
                product
            }
            None => None,
        };

        for (label, v) in [
            ("quantity", quantity),
            ("unit price", unit_price),
            ("total", stated_total),
        ] {
            if let Some(v) = v
                && v.is_sign_negative()
                && !v.is_zero()
            {
                anomalies.push(format!("line item {line}: negative {label} ({v})"));
            }
        }

        if let (Some(stated), Some(expected)) = (stated_total, computed)
            && stated
                .checked_sub(expected)
                .is_none_or(|diff| diff.abs() > AMOUNT_TOLERANCE)
        {
            anomalies.push(format!(
                "line item {line}: total {stated} does not equal quantity x unit price ({expected})"
            ));
        }

        out.push(LineItem {
            description,
            quantity,
            unit_price,
            total: stated_total.or(computed),
        });
    }
    out
}

fn find_counterparties(roots: &[&Map<String, Value>]) -> Vec<Counterparty> {
    let mut found: Vec<Counterparty> = Vec::new();
    let mut queue: VecDeque<&Map<String, Value>> = roots.iter().copied().collect();
    while let Some(map) = queue.pop_front() {
        for (key, value) in map {
            let normalized = normalize_key(key);
            if COUNTERPARTY_KEYS.contains(&normalized.as_str()) {
                if found.iter().any(|c| c.role == normalized) {
                    continue;
                }
                if let Some(party) = parse_counterparty(&normalized, value) {
                    found.push(party);
                }
            } else if let Value::Object(child) = value
                && !LINE_ITEM_KEYS.contains(&normalized.as_str())
            {
                queue.push_back(child);
            }
        }
    }
    found
}

fn parse_counterparty(role: &str, value: &Value) -> Option<Counterparty> {
    let (name, email) = match value {
        Value::Object(map) => (
            lookup(map, PARTY_NAME_KEYS).and_then(scalar_string),
            lookup(map, PARTY_EMAIL_KEYS).and_then(scalar_string),
        ),
        Value::String(s) if s.contains('@') => (None, Some(s.trim().to_string())),
        other => (scalar_string(other), None),
    };
    if name.is_none() && email.is_none() {
        return None;
    }
    Some(Counterparty {
        role: role.to_string(),
        name,
        email,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn extract(text: &str) -> JsonRecord {
        JsonAgent::new().extract(text, Intent::Invoice)
    }

    #[test]
    fn camel_case_invoice() {
        let record = extract(
            r#"{
                "invoiceNumber": "INV-1001",
                "grandTotal": 1250.50,
                "currency": "usd",
                "customer": {"name": "Acme Corp", "email": "ap@acme.example"},
                "items": [
                    {"description": "Widget", "qty": 10, "price": 100},
                    {"description": "Setup", "qty": 1, "price": 250.50, "total": 250.50}
                ]
            }"#,
        );
        assert_eq!(record.status, ExtractionStatus::Complete);
        assert_eq!(record.document_id.as_deref(), Some("INV-1001"));
        assert_eq!(record.document_type.as_deref(), Some("invoice"));
        assert_eq!(record.total_amount, Some(dec!(1250.50)));
        assert_eq!(record.currency.as_deref(), Some("USD"));
        assert_eq!(record.line_items.len(), 2);
        assert_eq!(record.line_items[0].total, Some(dec!(1000)));
        assert_eq!(record.counterparties.len(), 1);
        assert_eq!(record.counterparties[0].role, "customer");
        assert_eq!(record.counterparties[0].name.as_deref(), Some("Acme Corp"));
        assert!(record.anomalies.is_empty(), "{:?}", record.anomalies);
    }

    #[test]
    fn wrapped_snake_case_payload() {
        let record = extract(
            r#"{"data": {"invoice": {"document_id": "D-7", "document_type": "Invoice", "total_amount": "$12,500.00"}}}"#,
        );
        assert_eq!(record.document_id.as_deref(), Some("D-7"));
        assert_eq!(record.document_type.as_deref(), Some("invoice"));
        assert_eq!(record.total_amount, Some(dec!(12500.00)));
        assert_eq!(record.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn nested_counterparty_ids_are_not_document_ids() {
        let record = extract(r#"{"customer": {"id": "C-1", "name": "Zed"}, "total": 5, "currency": "EUR"}"#);
        assert!(record.document_id.is_none());
        assert_eq!(record.status, ExtractionStatus::Partial);
        assert_eq!(record.missing_fields, vec!["document_id"]);
    }

    #[test]
    fn malformed_json() {
        let record = extract("{\"invoiceNumber\": ");
        assert_eq!(record.status, ExtractionStatus::MalformedInput);
        assert!(record.detail.unwrap().starts_with("invalid JSON"));
        assert_eq!(record.missing_fields.len(), 3);
    }

    #[test]
    fn empty_payload_is_malformed() {
        assert_eq!(extract("  ").status, ExtractionStatus::MalformedInput);
    }

    #[test]
    fn unknown_shape_is_schema_mismatch() {
        let record = JsonAgent::new().extract(r#"{"foo": 1, "bar": {"baz": true}}"#, Intent::Other);
        assert_eq!(record.status, ExtractionStatus::SchemaMismatch);
        assert!(record.document_type.is_none());
        assert!(record.detail.is_some());
    }

    #[test]
    fn partial_match_populates_what_it_can() {
        let record = extract(r#"{"vendor": "Parts Ltd", "currency": "GBP"}"#);
        assert_eq!(record.status, ExtractionStatus::SchemaMismatch);
        assert_eq!(record.currency.as_deref(), Some("GBP"));
        assert_eq!(record.counterparties[0].name.as_deref(), Some("Parts Ltd"));
    }

    #[test]
    fn anomalies_are_reported() {
        let record = extract(
            r#"{"id": "X", "total": 100, "items": [
                {"name": "a", "quantity": 2, "unit_price": 10, "total": 25},
                {"name": "b", "quantity": 1, "unit_price": -5, "total": -5}
            ]}"#,
        );
        assert!(record.anomalies.iter().any(|a| a.contains("line item 1: total 25")));
        assert!(record.anomalies.iter().any(|a| a.contains("line item 2: negative unit price")));
        assert!(record.anomalies.iter().any(|a| a.contains("line items sum to 20")));
        assert!(record.anomalies.iter().any(|a| a.contains("without a currency")));
    }

    #[test]
    fn amount_strings_with_codes() {
        assert_eq!(parse_amount_str("1,250.00 EUR"), (Some(dec!(1250.00)), Some("EUR".into())));
        assert_eq!(parse_amount_str("£99"), (Some(dec!(99)), Some("GBP".into())));
        assert_eq!(parse_amount_str("n/a"), (None, None));
    }

    #[test]
    fn key_normalization() {
        assert_eq!(normalize_key("Grand_Total"), "grandtotal");
        assert_eq!(normalize_key("line-items"), "lineitems");
        assert_eq!(normalize_key("Bill To"), "billto");
    }

    #[test]
    fn huge_line_item_overflow_is_an_anomaly() {
        let record = extract(
            r#"{"invoiceNumber": "INV-9", "grandTotal": 10, "currency": "USD",
                "items": [{"qty": 100000000000000000000, "price": 100000000000000000000}]}"#,
        );
        assert_eq!(record.status, ExtractionStatus::Complete);
        assert_eq!(record.line_items.len(), 1);
        assert_eq!(record.line_items[0].total, None);
        assert!(
            record
                .anomalies
                .iter()
                .any(|a| a == "line item 1: amount overflow")
        );
    }
}
