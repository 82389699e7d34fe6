//! # pdf-waterfall
//!
//! Extract text from PDFs, including scanned Hebrew documents, by falling
//! through a ladder of increasingly expensive backends until one produces
//! readable text.
//!
//! ## Why a waterfall?
//!
//! No single extractor handles every PDF. A cloud parsing service gives the
//! best text but is slow and may not be configured. The embedded text layer
//! is free and instant but, for scans, is often missing or garbage. OCR
//! copes with scans but costs money per call. Trying them in order of
//! quality, and only moving on when the previous tier produced nothing
//! usable, gets the best text for the least money.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Async job  upload to a parsing service, poll until done (≤120 s)
//!  ├─ 2. Local      PDFium text layer, kept only if ≥20% Hebrew characters
//!  ├─ 3. OCR        OCR.space, three engine/language parameter sets
//!  └─ 4. Empty      nothing usable: success with empty text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_waterfall::{extract_text, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractionConfig::builder()
//!         .ocr_api_key(std::env::var("OCR_SPACE_API_KEY")?)
//!         .build()?;
//!     let bytes = std::fs::read("scan.pdf")?;
//!     let response = extract_text(bytes, "scan.pdf", "application/pdf", &config).await;
//!     println!("{}", serde_json::to_string(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf-waterfall` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | Enables [`server`], the axum upload endpoint |
//!
//! Disable both when using only the library:
//! ```toml
//! pdf-waterfall = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod input;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod script;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AsyncJobConfig, ExtractionConfig, ExtractionConfigBuilder, LocalConfig, OcrConfig,
    QualityConfig,
};
pub use document::Document;
pub use error::{BackendError, ExtractError};
pub use extract::{extract_file, extract_text, extract_text_sync, extract_to_file, Extractor};
pub use observer::{ExtractionObserver, NoopObserver};
pub use output::{
    AttemptOutcome, BackendKind, ExtractTextResponse, ExtractionAttempt, ExtractionResult,
};
pub use pipeline::ExtractionBackend;
pub use script::{script_ratio, ScriptRange, HEBREW};
