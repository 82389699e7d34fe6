//! Extraction backends, one per tier of the waterfall.
//!
//! Each submodule implements exactly one strategy behind the shared
//! [`ExtractionBackend`] trait, so the orchestrator in [`crate::extract`]
//! can be exercised with fakes and each backend can be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! Document ──▶ async_job ──▶ local ──▶ (script ratio) ──▶ ocr ──▶ empty
//!              (upload+poll)  (pdfium)                    (3 param sets)
//! ```
//!
//! 1. [`async_job`]: upload to a cloud parsing service, poll the job until
//!    it finishes or the deadline passes. Best quality, highest latency.
//! 2. [`local`]: decode the embedded text layer with PDFium on the
//!    blocking pool. Fast and free, useless for scans.
//! 3. [`ocr`]: post the PDF to an OCR service, cycling through three
//!    engine/language parameter sets on processing errors.
//!
//! A backend never returns `Err`: every failure is folded into an
//! [`ExtractionAttempt`] so it cannot abort the waterfall.

pub mod async_job;
pub mod local;
pub mod ocr;

use crate::document::{Document, PDF_CONTENT_TYPE};
use crate::error::BackendError;
use crate::output::{BackendKind, ExtractionAttempt};
use async_trait::async_trait;
use reqwest::multipart::Part;
use tracing::warn;

/// One tier of the waterfall.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Which tier this is.
    fn kind(&self) -> BackendKind;

    /// `false` when the backend lacks its configuration. Unavailable
    /// backends are skipped without being invoked.
    fn is_available(&self) -> bool {
        true
    }

    /// Extract text from `document`. Must not panic on provider or input
    /// failures; those become a failed or inconclusive attempt.
    async fn extract(&self, document: &Document) -> ExtractionAttempt;
}

/// Map a `reqwest` error onto the transport failure of `backend`.
pub(crate) fn transport_error(backend: BackendKind, e: reqwest::Error) -> BackendError {
    let detail = if e.is_timeout() {
        format!("request timed out: {e}")
    } else if let Some(status) = e.status() {
        format!("HTTP {status}")
    } else {
        e.to_string()
    };
    BackendError::Transport { backend, detail }
}

/// The multipart `file` part carrying the document.
pub(crate) fn file_part(document: &Document) -> Part {
    let part = || {
        Part::bytes(document.bytes().to_vec()).file_name(document.filename().to_string())
    };
    match part().mime_str(document.content_type()) {
        Ok(p) => p,
        Err(_) => {
            warn!(
                "Unparseable content type '{}', uploading as {}",
                document.content_type(),
                PDF_CONTENT_TYPE
            );
            part().mime_str(PDF_CONTENT_TYPE).unwrap_or_else(|_| part())
        }
    }
}

/// Serialise `value` for a debug log line, cut to at most `max` chars.
pub(crate) fn preview(value: &serde_json::Value, max: usize) -> String {
    let s = value.to_string();
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let v = serde_json::json!({"text": "שלום עולם"});
        let p = preview(&v, 12);
        assert!(p.ends_with('…'));
        assert_eq!(p.chars().count(), 13);
    }

    #[test]
    fn preview_keeps_short_values() {
        let v = serde_json::json!({"id": 1});
        assert_eq!(preview(&v, 100), r#"{"id":1}"#);
    }
}
