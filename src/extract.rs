//! Text extraction from binary documents.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::ExtractError;

/// Turns document bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

/// PDF text extraction backed by `pdf-extract`.
///
/// The underlying parser can panic on malformed files; panics are caught and
/// reported as [`ExtractError::Panicked`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(ExtractError::Unreadable(e.to_string())),
            Err(payload) => Err(ExtractError::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

/// Best-effort message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
