//! Integration tests for the intake HTTP API.
//!
//! Each test spins up an Axum server on a random port and drives it with
//! reqwest multipart requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use uuid::Uuid;

use intake_agent::config::IntakeConfig;
use intake_agent::error::StoreError;
use intake_agent::extract::PdfTextExtractor;
use intake_agent::pipeline::IntakePipeline;
use intake_agent::pipeline::types::ConversationContext;
use intake_agent::server::intake_routes;
use intake_agent::store::{ContextStore, LibSqlContextStore, MemoryContextStore};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Store that is always down.
struct UnavailableStore;

#[async_trait]
impl ContextStore for UnavailableStore {
    async fn put(&self, _id: Uuid, _context: &ConversationContext) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn get(&self, _id: Uuid) -> Result<Option<ConversationContext>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Start an Axum server on a random port, return the port.
async fn start_server(store: Arc<dyn ContextStore>) -> u16 {
    let config = IntakeConfig::default();
    let pipeline =
        IntakePipeline::from_config(&config, Arc::new(PdfTextExtractor), store).unwrap();
    let app = intake_routes(Arc::new(pipeline), config.max_upload_bytes);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    port
}

async fn post_form(port: u16, form: Form) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/process_input"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body: Value = resp.json().await.unwrap();
    (status, body)
}

fn file_form(filename: &str, bytes: &[u8]) -> Form {
    Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(filename.to_string()))
}

#[tokio::test]
async fn health_ok() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "intake-agent");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn raw_text_is_unclassified() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let (status, body) = post_form(
            port,
            Form::new().text("raw_text_input", "Just some random text..."),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["classification"]["format"], "Other");
        assert_eq!(body["classification"]["intent"], "Other");
        assert_eq!(body["extraction"]["record_type"], "Unclassified");
        assert_eq!(body["extraction"]["status"], "No_Specific_Agent_Applicable");
        assert_eq!(body["action"]["action_type"], "Input Classification Required");
        assert_eq!(body["status"], "pending_classification");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn json_invoice_threshold() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let (status, low) = post_form(
            port,
            file_form(
                "small.json",
                br#"{"invoiceNumber": "INV-1", "grandTotal": 499.99, "currency": "USD"}"#,
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(low["extraction"]["record_type"], "JSONRecord");
        assert_eq!(low["extraction"]["total_amount"], 499.99);
        assert_eq!(low["action"]["action_type"], "Log Transaction");
        assert_eq!(low["status"], "success");

        let (status, high) = post_form(
            port,
            file_form(
                "large.json",
                br#"{"invoiceNumber": "INV-2", "grandTotal": 48000, "currency": "USD"}"#,
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(high["action"]["action_type"], "Review High Value Invoice");
        assert_eq!(high["status"], "pending_review");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rfq_email_upload() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let email = "From: Jane Buyer <jane@acme.example>\r\n\
                     Subject: RFQ for 1,000 hex bolts\r\n\
                     Date: Wed, 5 Jun 2024 08:15:00 +0000\r\n\
                     \r\n\
                     Hi,\r\nCould you send us a quote for 1,000 M8 hex bolts?\r\n";
        let (status, body) = post_form(port, file_form("rfq.eml", email.as_bytes())).await;
        assert_eq!(status, 200);
        assert_eq!(body["classification"]["format"], "Email");
        assert_eq!(body["classification"]["intent"], "RFQ");
        assert_eq!(body["extraction"]["record_type"], "EmailRecord");
        assert_eq!(body["extraction"]["sender_email"], "jane@acme.example");
        assert_eq!(body["action"]["action_type"], "Escalate to CRM");
        assert_eq!(body["status"], "success");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn compliance_document_is_flagged() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let (status, body) = post_form(
            port,
            Form::new().text(
                "raw_text_input",
                "Section 1 Purpose\nThis policy sets out our GDPR and HIPAA obligations.",
            ),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["classification"]["format"], "PDF");
        let flags = &body["extraction"]["regulatory_compliance_flags"];
        assert_eq!(flags["contains_gdpr_keywords"], true);
        assert_eq!(flags["contains_hipaa_keywords"], true);
        assert_eq!(flags["contains_sox_keywords"], false);
        assert_eq!(body["action"]["action_type"], "Flag Compliance Document");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn compressed_pdf_upload_classifies_from_text() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let pdf = include_bytes!("fixtures/policy.pdf");
        // Content stream is FlateDecode; the keywords only exist after extraction.
        assert!(!pdf.windows(4).any(|w| w == b"GDPR"));

        let (status, body) = post_form(port, file_form("policy.pdf", pdf)).await;
        assert_eq!(status, 200);
        assert_eq!(body["classification"]["format"], "PDF");
        assert_eq!(body["classification"]["intent"], "Regulation");
        let flags = &body["extraction"]["regulatory_compliance_flags"];
        assert_eq!(flags["contains_gdpr_keywords"], true);
        assert_eq!(flags["contains_hipaa_keywords"], true);
        assert_eq!(body["action"]["action_type"], "Flag Compliance Document");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unsupported_extension_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let (status, body) = post_form(port, file_form("photo.png", b"\x89PNG")).await;
        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("Unsupported file type"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_input_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(MemoryContextStore::new())).await;

        let (status, _) = post_form(port, Form::new().text("raw_text_input", "   ")).await;
        assert_eq!(status, 400);

        let (status, _) = post_form(port, Form::new().text("other_field", "ignored")).await;
        assert_eq!(status, 400);

        let (status, body) = post_form(port, file_form("blank.txt", b"  \n\t \r\n")).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Input content is empty after processing");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn store_outage_is_a_server_error() {
    timeout(TEST_TIMEOUT, async {
        let port = start_server(Arc::new(UnavailableStore)).await;

        let (status, body) = post_form(
            port,
            Form::new().text("raw_text_input", "Just some random text..."),
        )
        .await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "Pipeline failed");
        assert!(body["details"].as_str().unwrap().contains("connection refused"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn conversation_can_be_fetched_back() {
    timeout(TEST_TIMEOUT, async {
        let store = LibSqlContextStore::new_memory().await.unwrap();
        let port = start_server(Arc::new(store)).await;

        let (_, body) = post_form(
            port,
            file_form("order.json", br#"{"orderId": "O-5", "total": 20, "currency": "EUR"}"#),
        )
        .await;
        let id = body["conversation_id"].as_str().unwrap().to_string();

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/api/conversations/{id}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let stored: Value = resp.json().await.unwrap();
        assert_eq!(stored["id"], id.as_str());
        assert_eq!(stored["raw_input_ref"]["filename"], "order.json");
        assert_eq!(stored["extraction"]["document_type"], "order");
        assert_eq!(stored["action"]["action_type"], "Log Transaction");

        let missing = reqwest::get(format!(
            "http://127.0.0.1:{port}/api/conversations/{}",
            Uuid::new_v4()
        ))
        .await
        .unwrap();
        assert_eq!(missing.status(), 404);
    })
    .await
    .expect("test timed out");
}
