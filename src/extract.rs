//! The extraction orchestrator and the library entry points.
//!
//! [`Extractor`] walks the tiers in a fixed order and stops at the first
//! good result:
//!
//! ```text
//! async job ──good?──▶ done
//!     │
//!   local ──text && ratio ≥ threshold?──▶ done
//!     │        (under-threshold text is discarded)
//!    ocr ──good?──▶ done
//!     │
//!  empty result (still a success)
//! ```
//!
//! Backends are never run concurrently for one document, and no tier is
//! started before the previous one has returned.

use crate::config::{ExtractionConfig, QualityConfig};
use crate::document::Document;
use crate::error::{BackendError, ExtractError};
use crate::input;
use crate::observer::{NoopObserver, SharedObserver};
use crate::output::{ExtractTextResponse, ExtractionAttempt, ExtractionResult};
use crate::pipeline::async_job::AsyncJobBackend;
use crate::pipeline::local::LocalBackend;
use crate::pipeline::ocr::OcrBackend;
use crate::pipeline::ExtractionBackend;
use crate::script::script_ratio;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Download timeout used by [`extract_file`] for URL inputs.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Runs the waterfall. Cheap to share behind an `Arc`; one instance can
/// serve any number of concurrent documents.
pub struct Extractor {
    async_job: Arc<dyn ExtractionBackend>,
    local: Arc<dyn ExtractionBackend>,
    ocr: Arc<dyn ExtractionBackend>,
    quality: QualityConfig,
    observer: SharedObserver,
}

impl Extractor {
    /// Build the production backends from `config`.
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        Ok(Self::from_backends(
            Arc::new(AsyncJobBackend::new(&config.async_job)?),
            Arc::new(LocalBackend::pdfium(&config.local)),
            Arc::new(OcrBackend::new(&config.ocr)?),
            config,
        ))
    }

    /// Assemble an extractor from arbitrary backends. Quality settings and
    /// the observer still come from `config`.
    pub fn from_backends(
        async_job: Arc<dyn ExtractionBackend>,
        local: Arc<dyn ExtractionBackend>,
        ocr: Arc<dyn ExtractionBackend>,
        config: &ExtractionConfig,
    ) -> Self {
        Self {
            async_job,
            local,
            ocr,
            quality: config.quality.clone(),
            observer: config
                .observer
                .clone()
                .unwrap_or_else(|| Arc::new(NoopObserver)),
        }
    }

    /// Run the waterfall for one document. Never fails: when no tier
    /// produces usable text the result is empty.
    pub async fn extract(&self, document: &Document) -> ExtractionResult {
        let start = Instant::now();
        info!(
            "Extracting '{}' ({} bytes, {})",
            document.filename(),
            document.len(),
            document.content_type()
        );

        let mut attempts = Vec::with_capacity(3);

        // ── Tier 1: async job ────────────────────────────────────────────
        if let Some(attempt) = self.run(&self.async_job, document).await {
            if attempt.has_text() {
                return self.finish(attempt, attempts, start);
            }
            attempts.push(attempt);
        }

        // ── Tier 2: local decode, gated by script ratio ──────────────────
        if let Some(mut attempt) = self.run(&self.local, document).await {
            if attempt.has_text() {
                let ratio = script_ratio(&attempt.text, &self.quality.script_ranges);
                let threshold = self.quality.acceptance_threshold;
                if ratio >= threshold {
                    info!("Local text accepted (script ratio {:.3})", ratio);
                    return self.finish(attempt, attempts, start);
                }
                warn!(
                    "Local text rejected: script ratio {:.3} below {:.3}",
                    ratio, threshold
                );
                self.observer.on_quality_rejected(attempt.backend, ratio);
                attempt.text.clear();
                attempt.error = Some(BackendError::QualityRejected {
                    backend: attempt.backend,
                    ratio,
                    threshold,
                });
            }
            attempts.push(attempt);
        }

        // ── Tier 3: OCR ──────────────────────────────────────────────────
        // OCR's page count survives a blank read.
        let mut pages = 0;
        if let Some(attempt) = self.run(&self.ocr, document).await {
            if attempt.has_text() {
                return self.finish(attempt, attempts, start);
            }
            pages = attempt.pages;
            attempts.push(attempt);
        }

        info!(
            "No tier produced text for '{}'; returning empty result",
            document.filename()
        );
        for a in &mut attempts {
            a.text.clear();
        }
        let mut result = ExtractionResult::empty(attempts);
        result.pages = pages;
        self.observer.on_complete(&result);
        result
    }

    /// Validate the document, then run [`Self::extract`] on its own task so
    /// a panic inside a backend surfaces as [`ExtractError::Internal`]
    /// instead of tearing down the caller.
    pub async fn extract_guarded(
        self: &Arc<Self>,
        document: Document,
    ) -> Result<ExtractionResult, ExtractError> {
        if document.is_empty() {
            return Err(ExtractError::NoDocument);
        }
        let this = Arc::clone(self);
        tokio::spawn(async move { this.extract(&document).await })
            .await
            .map_err(|e| {
                error!("Extraction task aborted: {}", e);
                ExtractError::Internal(format!("extraction task aborted: {e}"))
            })
    }

    /// Invoke one tier, or skip it when unavailable.
    async fn run(
        &self,
        backend: &Arc<dyn ExtractionBackend>,
        document: &Document,
    ) -> Option<ExtractionAttempt> {
        let kind = backend.kind();
        if !backend.is_available() {
            info!("Skipping {}: not configured", kind);
            self.observer.on_backend_skipped(kind);
            return None;
        }

        info!("Trying {}", kind);
        self.observer.on_backend_start(kind);
        let attempt = backend.extract(document).await;
        match &attempt.error {
            Some(e) => warn!("{} produced no usable text: {}", kind, e),
            None => info!(
                "{} returned {} chars, {} pages",
                kind,
                attempt.text.chars().count(),
                attempt.pages
            ),
        }
        self.observer.on_attempt(&attempt);
        Some(attempt)
    }

    fn finish(
        &self,
        winner: ExtractionAttempt,
        mut attempts: Vec<ExtractionAttempt>,
        start: Instant,
    ) -> ExtractionResult {
        let backend = winner.backend;
        let text = winner.text.clone();
        let pages = winner.pages;
        info!(
            "Extracted {} chars via {} in {}ms",
            text.chars().count(),
            backend,
            start.elapsed().as_millis()
        );

        for a in &mut attempts {
            a.text.clear();
        }
        attempts.push(ExtractionAttempt {
            text: String::new(),
            ..winner
        });

        let result = ExtractionResult {
            text,
            pages,
            backend: Some(backend),
            attempts,
        };
        self.observer.on_complete(&result);
        result
    }
}

/// The inbound `ExtractText` boundary: bytes in, response shape out.
///
/// Request-level failures (no document, a panic escaping every backend)
/// become a failure response; everything else is a success, possibly with
/// empty text.
pub async fn extract_text(
    bytes: impl Into<Arc<[u8]>>,
    filename: impl Into<String>,
    content_type: impl Into<String>,
    config: &ExtractionConfig,
) -> ExtractTextResponse {
    let document = Document::new(bytes, filename, content_type);
    let extractor = match Extractor::new(config) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            error!("Could not build extractor: {}", e);
            return ExtractTextResponse::from(&e);
        }
    };
    match extractor.extract_guarded(document).await {
        Ok(result) => result.into(),
        Err(e) => ExtractTextResponse::from(&e),
    }
}

/// Load a local path or URL and extract its text.
///
/// # Errors
/// Only input problems are fatal: missing or unreadable file, failed
/// download, empty input, or bytes that are not a PDF.
pub async fn extract_file(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let document = input::load_document(input_str.as_ref(), DEFAULT_DOWNLOAD_TIMEOUT_SECS).await?;
    let extractor = Arc::new(Extractor::new(config)?);
    extractor.extract_guarded(document).await
}

/// Extract and write the text directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    let result = extract_file(input_str, config).await?;
    write_atomic(output_path.as_ref(), &result.text).await?;
    Ok(result)
}

/// Synchronous wrapper around [`extract_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_text_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_file(input_str, config))
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), ExtractError> {
    let write_failed = |source: std::io::Error| ExtractError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
    }

    let tmp_path = path.with_extension("txt.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_failed)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(write_failed)
}
