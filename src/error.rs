//! Error types for the pdf-waterfall library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal**: the request cannot be served at all
//!   (no document supplied, input file unreadable, invalid configuration).
//!   Returned as `Err(ExtractError)` from the top-level `extract*` functions.
//!
//! * [`BackendError`]: **Non-fatal**: one backend could not produce usable
//!   text (provider not configured, network failure, job timeout, noise
//!   instead of text). Stored inside [`crate::output::ExtractionAttempt`];
//!   the waterfall simply moves on to the next backend.
//!
//! A document on which every backend fails is *not* an error: the pipeline
//! returns a successful [`crate::output::ExtractionResult`] with empty text.

use crate::output::BackendKind;
use std::path::PathBuf;
use thiserror::Error;

/// Message used on the wire when no document was supplied.
pub const NO_DOCUMENT_MESSAGE: &str = "No PDF file provided";

/// Message used on the wire when the upload exceeds the body limit.
pub const TOO_LARGE_MESSAGE: &str = "PDF file too large";

/// Message used on the wire when an internal fault escaped every backend.
pub const INTERNAL_FAULT_MESSAGE: &str = "Failed to parse PDF";

/// All fatal errors returned by the pdf-waterfall library.
///
/// Backend-level failures use [`BackendError`] and never surface here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request carried no document, or a zero-byte one.
    #[error("No PDF file provided")]
    NoDocument,

    /// The upload exceeded the server's body limit.
    #[error("PDF file too large")]
    UploadTooLarge,

    // ── Input errors (CLI / file entry points) ────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input was read, but does not start with the `%PDF` magic bytes.
    #[error("Input is not a PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// Could not create or write the output text file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A fault escaped every backend boundary (task panic, runtime failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// The message placed in the `error` field of a failed `ExtractText`
    /// response.
    ///
    /// Internal details stay in the logs; callers only ever see a fixed
    /// string.
    pub fn wire_message(&self) -> &'static str {
        match self {
            ExtractError::NoDocument => NO_DOCUMENT_MESSAGE,
            ExtractError::UploadTooLarge => TOO_LARGE_MESSAGE,
            _ => INTERNAL_FAULT_MESSAGE,
        }
    }

    /// `true` when the failure is the caller's fault (missing input) rather
    /// than ours. The HTTP surface maps this to 400 instead of 500.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExtractError::NoDocument
                | ExtractError::UploadTooLarge
                | ExtractError::InvalidInput { .. }
                | ExtractError::NotAPdf { .. }
        )
    }
}

/// A non-fatal failure of a single backend.
///
/// Every variant is swallowed at the backend boundary, logged, and recorded
/// in the attempt trail. None of them aborts the waterfall.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum BackendError {
    /// No credential / base URL configured, or the local decoder could not
    /// be loaded. The backend is skipped.
    #[error("{backend}: unavailable ({reason})")]
    Unavailable { backend: BackendKind, reason: String },

    /// Network failure, timeout, non-2xx status or an undecodable body.
    #[error("{backend}: transport failure: {detail}")]
    Transport { backend: BackendKind, detail: String },

    /// The local decoder rejected the document as malformed.
    #[error("{backend}: decode failure: {detail}")]
    Decode { backend: BackendKind, detail: String },

    /// Text was produced, but too few characters belong to the target
    /// script. The text is discarded.
    #[error("{backend}: text rejected, script ratio {ratio:.3} below {threshold:.3}")]
    QualityRejected {
        backend: BackendKind,
        ratio: f64,
        threshold: f64,
    },

    /// The parsing job did not reach a terminal state before the deadline.
    #[error("{backend}: job {job_id} still {last_state} after {deadline_ms}ms")]
    JobTimeout {
        backend: BackendKind,
        job_id: String,
        last_state: String,
        deadline_ms: u64,
    },

    /// The provider answered, but reported that it could not process the
    /// document (OCR processing error, job failed or cancelled).
    #[error("{backend}: provider rejected the document: {detail}")]
    ProviderRejected { backend: BackendKind, detail: String },

    /// The provider reported success but no text field could be found.
    #[error("{backend}: completed without text")]
    NoText { backend: BackendKind },
}
