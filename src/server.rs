//! HTTP endpoints for the intake pipeline.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::error::{ConfigError, Result};
use crate::extract::PdfTextExtractor;
use crate::pipeline::IntakePipeline;
use crate::pipeline::types::RawInput;
use crate::store::{ContextStore, LibSqlContextStore, MemoryContextStore};

/// File extensions accepted on upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "json", "txt", "eml"];

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IntakePipeline>,
}

/// Open the configured context store and wire the full application.
pub async fn build_app(config: &IntakeConfig) -> Result<Router> {
    let store: Arc<dyn ContextStore> = match &config.db_path {
        Some(path) => Arc::new(LibSqlContextStore::new_local(path).await?),
        None => Arc::new(MemoryContextStore::new()),
    };
    let pipeline = IntakePipeline::from_config(config, Arc::new(PdfTextExtractor), store)
        .map_err(|e| ConfigError::InvalidValue {
            key: "INTAKE_REGULATORY_KEYWORDS".into(),
            message: e.to_string(),
        })?;
    Ok(intake_routes(Arc::new(pipeline), config.max_upload_bytes))
}

/// Build the router with the intake and conversation routes.
pub fn intake_routes(pipeline: Arc<IntakePipeline>, max_upload_bytes: usize) -> Router {
    let state = AppState { pipeline };

    Router::new()
        .route("/health", get(health))
        .route("/process_input", post(process_input))
        .route("/api/conversations/{id}", get(get_conversation))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "intake-agent"
    }))
}

// ── Intake ──────────────────────────────────────────────────────────────

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message.into()})),
    )
}

fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Accepts multipart `file` or `raw_text_input`. A file wins when both are sent.
async fn process_input(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut raw_text: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Rejected multipart body");
                return (
                    e.status(),
                    Json(serde_json::json!({"error": e.body_text()})),
                );
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        if !filename.is_empty() {
                            upload = Some((filename, bytes.to_vec()));
                        }
                    }
                    Err(e) => {
                        return (
                            e.status(),
                            Json(serde_json::json!({"error": e.body_text()})),
                        );
                    }
                }
            }
            "raw_text_input" => match field.text().await {
                Ok(text) => raw_text = Some(text),
                Err(e) => {
                    return (
                        e.status(),
                        Json(serde_json::json!({"error": e.body_text()})),
                    );
                }
            },
            _ => {}
        }
    }

    let input = match (upload, raw_text) {
        (Some((filename, bytes)), _) => {
            if !has_allowed_extension(&filename) {
                return bad_request(format!(
                    "Unsupported file type: {filename}. Allowed: .pdf, .json, .txt, .eml"
                ));
            }
            if bytes.is_empty() {
                return bad_request("Uploaded file is empty");
            }
            let input = RawInput::file(filename, bytes);
            if !input.is_pdf_binary() && input.as_text().trim().is_empty() {
                return bad_request("Input content is empty after processing");
            }
            input
        }
        (None, Some(text)) if !text.trim().is_empty() => RawInput::text(text),
        _ => return bad_request("No input provided. Send a file or raw_text_input."),
    };

    match state.pipeline.run(input).await {
        Ok(response) => {
            info!(
                conversation_id = %response.conversation_id,
                status = response.status.label(),
                "Input processed"
            );
            (StatusCode::OK, Json(serde_json::json!(response)))
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "Pipeline failed",
                "details": e.to_string(),
            })),
        ),
    }
}

// ── Conversations ───────────────────────────────────────────────────────

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let conversation_id = match Uuid::parse_str(&id) {
        Ok(id) => id,
        Err(_) => return bad_request("Invalid conversation ID"),
    };

    match state.pipeline.conversation(conversation_id).await {
        Ok(Some(context)) => (StatusCode::OK, Json(serde_json::json!(context))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Conversation not found"})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": "Context store unavailable",
                "details": e.to_string(),
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_app_reports_store_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();

        let config = IntakeConfig {
            db_path: Some(blocker.join("intake.db")),
            ..IntakeConfig::default()
        };
        let err = build_app(&config).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Store(_)));
    }

    #[tokio::test]
    async fn build_app_with_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = IntakeConfig {
            db_path: Some(dir.path().join("data").join("intake.db")),
            ..IntakeConfig::default()
        };
        assert!(build_app(&config).await.is_ok());
        assert!(dir.path().join("data").join("intake.db").exists());
    }

    #[test]
    fn extension_allow_list() {
        assert!(has_allowed_extension("report.PDF"));
        assert!(has_allowed_extension("mail.eml"));
        assert!(!has_allowed_extension("image.png"));
        assert!(!has_allowed_extension("no_extension"));
    }
}
