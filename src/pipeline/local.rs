//! Local text decoding via PDFium.
//!
//! ## Why a lazily-filled slot?
//!
//! Binding libpdfium means `dlopen`ing a ~30 MB shared library, and it can
//! fail (library missing, wrong architecture). The decoder is therefore
//! built on first use, inside a [`tokio::sync::OnceCell`]:
//!
//! * concurrent first requests wait on a single initialisation attempt;
//! * a failed attempt leaves the slot empty, so the next request tries all
//!   loading strategies again instead of inheriting a cached failure;
//! * a successful attempt is kept for the life of the process and shared,
//!   read-only, by every request.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is synchronous C++ and can chew on a large document for seconds.
//! Both binding and decoding run on the blocking pool so Tokio workers keep
//! serving other requests; decoding is additionally bounded by a timeout.

use super::ExtractionBackend;
use crate::config::LocalConfig;
use crate::document::Document;
use crate::error::BackendError;
use crate::output::{BackendKind, ExtractionAttempt};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const KIND: BackendKind = BackendKind::Local;

/// Text layer decoded from a PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPdf {
    pub text: String,
    pub pages: usize,
}

/// Pure `bytes → (text, pages)` decoding interface.
///
/// Errors are plain descriptions; the backend wraps them into
/// [`BackendError::Decode`].
pub trait PdfDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPdf, String>;
}

/// Builds a decoder. Runs on the blocking pool; may fail.
pub type DecoderLoader = Arc<dyn Fn() -> Result<Arc<dyn PdfDecoder>, String> + Send + Sync>;

/// A shareable, lazily filled decoder slot.
pub type DecoderSlot = Arc<OnceCell<Arc<dyn PdfDecoder>>>;

/// The process-wide PDFium slot shared by every [`LocalBackend::pdfium`].
static PDFIUM_SLOT: Lazy<DecoderSlot> = Lazy::new(|| Arc::new(OnceCell::new()));

/// Tier 2: decode the embedded text layer.
pub struct LocalBackend {
    slot: DecoderSlot,
    loader: DecoderLoader,
    decode_timeout: Duration,
}

impl LocalBackend {
    /// The PDFium-backed decoder, sharing the process-wide slot.
    ///
    /// The first successful load wins for the whole process; a
    /// `library_path` configured on a later backend is ignored once PDFium
    /// is bound.
    pub fn pdfium(config: &LocalConfig) -> Self {
        let explicit = config.library_path.clone();
        let loader: DecoderLoader = Arc::new(move || {
            PdfiumDecoder::load(explicit.as_deref()).map(|d| Arc::new(d) as Arc<dyn PdfDecoder>)
        });
        Self::with_loader(Arc::clone(&PDFIUM_SLOT), loader, config.decode_timeout())
    }

    /// A backend that fills `slot` with `loader` on first use.
    pub fn with_loader(slot: DecoderSlot, loader: DecoderLoader, decode_timeout: Duration) -> Self {
        Self {
            slot,
            loader,
            decode_timeout,
        }
    }

    /// A backend around an already-built decoder.
    pub fn with_decoder(decoder: Arc<dyn PdfDecoder>, decode_timeout: Duration) -> Self {
        let slot = Arc::new(OnceCell::new_with(Some(Arc::clone(&decoder))));
        let loader: DecoderLoader = Arc::new(move || Ok(Arc::clone(&decoder)));
        Self::with_loader(slot, loader, decode_timeout)
    }

    /// The decoder, initialising the slot if this is the first use.
    async fn decoder(&self) -> Result<Arc<dyn PdfDecoder>, BackendError> {
        self.slot
            .get_or_try_init(|| {
                let loader = Arc::clone(&self.loader);
                async move {
                    tokio::task::spawn_blocking(move || loader())
                        .await
                        .map_err(|e| format!("decoder initialisation panicked: {e}"))?
                }
            })
            .await
            .map(Arc::clone)
            .map_err(|reason| BackendError::Unavailable {
                backend: KIND,
                reason,
            })
    }
}

#[async_trait]
impl ExtractionBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    async fn extract(&self, document: &Document) -> ExtractionAttempt {
        let decoder = match self.decoder().await {
            Ok(d) => d,
            Err(e) => {
                warn!("Local decoder unavailable: {}", e);
                return ExtractionAttempt::failed(KIND, e);
            }
        };

        let bytes = document.shared_bytes();
        let task = tokio::task::spawn_blocking(move || decoder.decode(&bytes));
        let decoded = match tokio::time::timeout(self.decode_timeout, task).await {
            Ok(Ok(Ok(decoded))) => decoded,
            Ok(Ok(Err(detail))) => {
                warn!("Local decode of '{}' failed: {}", document.filename(), detail);
                return ExtractionAttempt::failed(KIND, BackendError::Decode { backend: KIND, detail });
            }
            Ok(Err(join)) => {
                warn!("Local decode task panicked: {}", join);
                return ExtractionAttempt::failed(
                    KIND,
                    BackendError::Decode {
                        backend: KIND,
                        detail: format!("decoder panicked: {join}"),
                    },
                );
            }
            Err(_) => {
                warn!(
                    "Local decode of '{}' exceeded {}s",
                    document.filename(),
                    self.decode_timeout.as_secs()
                );
                return ExtractionAttempt::failed(
                    KIND,
                    BackendError::Decode {
                        backend: KIND,
                        detail: format!("timed out after {}s", self.decode_timeout.as_secs()),
                    },
                );
            }
        };

        let text = decoded.text.trim();
        debug!("Local decode: {} pages, {} chars", decoded.pages, text.chars().count());
        ExtractionAttempt::succeeded(KIND, text, decoded.pages)
    }
}

// ── PDFium ───────────────────────────────────────────────────────────────

/// Where to look for libpdfium. Tried in order on every load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStrategy {
    /// An explicit file, or a directory holding the platform library.
    Path(PathBuf),
    /// The platform library in the current working directory.
    WorkingDir,
    /// The platform's dynamic-library search path.
    System,
}

impl LoadStrategy {
    fn bind(&self) -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
        match self {
            LoadStrategy::Path(p) if p.is_dir() => {
                Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path(p))
            }
            LoadStrategy::Path(p) => Pdfium::bind_to_library(p),
            LoadStrategy::WorkingDir => {
                Pdfium::bind_to_library(&Pdfium::pdfium_platform_library_name_at_path("./"))
            }
            LoadStrategy::System => Pdfium::bind_to_system_library(),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Path(p) => write!(f, "path {}", p.display()),
            LoadStrategy::WorkingDir => f.write_str("working directory"),
            LoadStrategy::System => f.write_str("system library"),
        }
    }
}

/// Loading strategies in priority order: the configured path,
/// `PDFIUM_LIB_PATH`, the user cache directory, the working directory and
/// finally the system search path. Duplicates are dropped.
pub fn loading_strategies(explicit: Option<&Path>) -> Vec<LoadStrategy> {
    let mut out = Vec::new();
    let mut push = |s: LoadStrategy| {
        if !out.contains(&s) {
            out.push(s);
        }
    };

    if let Some(p) = explicit {
        push(LoadStrategy::Path(p.to_path_buf()));
    }
    if let Some(p) = std::env::var_os("PDFIUM_LIB_PATH").filter(|p| !p.is_empty()) {
        push(LoadStrategy::Path(PathBuf::from(p)));
    }
    if let Some(cache) = dirs::cache_dir() {
        let dir = cache.join("pdf-waterfall");
        if dir.is_dir() {
            push(LoadStrategy::Path(dir));
        }
    }
    push(LoadStrategy::WorkingDir);
    push(LoadStrategy::System);
    out
}

/// PDFium-backed [`PdfDecoder`].
///
/// Holds the strategy that bound successfully at load time; each decode
/// binds a fresh `Pdfium` instance on its blocking thread.
#[derive(Debug)]
pub struct PdfiumDecoder {
    strategy: LoadStrategy,
}

impl PdfiumDecoder {
    /// Find libpdfium using the first strategy that binds.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let mut failures = Vec::new();
        for strategy in loading_strategies(explicit) {
            match strategy.bind() {
                Ok(_) => {
                    info!("PDFium bound from {}", strategy);
                    return Ok(Self { strategy });
                }
                Err(e) => {
                    debug!("PDFium not found via {}: {:?}", strategy, e);
                    failures.push(format!("{strategy}: {e:?}"));
                }
            }
        }
        Err(format!("could not bind libpdfium ({})", failures.join("; ")))
    }
}

impl PdfDecoder for PdfiumDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPdf, String> {
        let pdfium = self
            .strategy
            .bind()
            .map(Pdfium::new)
            .map_err(|e| format!("rebinding PDFium via {}: {:?}", self.strategy, e))?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| format!("{e:?}"))?;

        let pages = document.pages();
        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| format!("page {}: {:?}", idx + 1, e))?;
            texts.push(text.all());
        }

        Ok(DecodedPdf {
            pages: texts.len(),
            text: texts.join("\n\n"),
        })
    }
}
