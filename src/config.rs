//! Configuration types for tiered text extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. One struct per backend keeps the knobs
//! that belong together in one place; the builder validates the whole set
//! before anything is sent over the network.
//!
//! Provider credentials have **no defaults**. A backend whose credential (and,
//! for the async job provider, base URL) is missing is reported as
//! unavailable and skipped; the pipeline never falls back to a baked-in key.

use crate::error::ExtractError;
use crate::observer::ExtractionObserver;
use crate::script::{ScriptRange, HEBREW};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default OCR provider endpoint (OCR.space).
pub const DEFAULT_OCR_BASE_URL: &str = "https://api.ocr.space";

/// Configuration for a tiered extraction run.
///
/// # Example
/// ```rust
/// use pdf_waterfall::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .ocr_api_key("K0000000000")
///     .acceptance_threshold(0.25)
///     .build()
///     .unwrap();
/// assert!(config.ocr.is_configured());
/// assert!(!config.async_job.is_configured());
/// ```
#[derive(Clone, Default)]
pub struct ExtractionConfig {
    pub async_job: AsyncJobConfig,
    pub local: LocalConfig,
    pub ocr: OcrConfig,
    pub quality: QualityConfig,

    /// Optional observer notified as each tier runs.
    pub observer: Option<Arc<dyn ExtractionObserver>>,
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("async_job", &self.async_job)
            .field("local", &self.local)
            .field("ocr", &self.ocr)
            .field("quality", &self.quality)
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn ExtractionObserver>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

// ── Per-backend sections ─────────────────────────────────────────────────

/// Cloud parsing job provider (LlamaParse-style upload + poll).
#[derive(Clone)]
pub struct AsyncJobConfig {
    /// Bearer token. `None` disables the backend.
    pub api_key: Option<String>,

    /// Base URL, e.g. `https://api.cloud.llamaindex.ai/api`. The backend
    /// appends `/parsing/upload` and `/parsing/jobs/{id}`. `None` disables
    /// the backend.
    pub base_url: Option<String>,

    /// Timeout of the upload call in seconds. Default: 120.
    pub upload_timeout_secs: u64,

    /// Timeout of each status request in seconds. Default: 15.
    ///
    /// Independent of the job deadline; a poll issued close to the deadline
    /// is additionally capped by the time remaining.
    pub poll_timeout_secs: u64,

    /// Pause between status requests in milliseconds. Default: 1500.
    pub poll_interval_ms: u64,

    /// Wall-clock budget for the whole job, measured from submission, in
    /// milliseconds. Default: 120 000.
    pub job_deadline_ms: u64,
}

impl Default for AsyncJobConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            upload_timeout_secs: 120,
            poll_timeout_secs: 15,
            poll_interval_ms: 1500,
            job_deadline_ms: 120_000,
        }
    }
}

impl AsyncJobConfig {
    /// Both the credential and the base URL are present and non-blank.
    pub fn is_configured(&self) -> bool {
        non_blank(&self.api_key) && non_blank(&self.base_url)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_deadline(&self) -> Duration {
        Duration::from_millis(self.job_deadline_ms)
    }
}

impl fmt::Debug for AsyncJobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncJobConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("job_deadline_ms", &self.job_deadline_ms)
            .finish()
    }
}

/// In-process PDFium decoder.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Explicit path to `libpdfium` (file or directory). Tried before the
    /// cache directory, the working directory and the system search path.
    pub library_path: Option<PathBuf>,

    /// Upper bound on one decode call in seconds. Default: 30.
    pub decode_timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            decode_timeout_secs: 30,
        }
    }
}

impl LocalConfig {
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_secs(self.decode_timeout_secs)
    }
}

/// OCR provider (OCR.space-style `POST /parse/image`).
#[derive(Clone)]
pub struct OcrConfig {
    /// API key sent as the `apikey` form field. `None` disables the backend.
    pub api_key: Option<String>,

    /// Provider base URL. Default: [`DEFAULT_OCR_BASE_URL`].
    pub base_url: String,

    /// Timeout of each OCR call in seconds. Default: 30.
    pub timeout_secs: u64,

    /// Language forced on the last retry. Default: `eng`.
    pub fallback_language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_OCR_BASE_URL.to_string(),
            timeout_secs: 30,
            fallback_language: "eng".to_string(),
        }
    }
}

impl OcrConfig {
    pub fn is_configured(&self) -> bool {
        non_blank(&self.api_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallback_language", &self.fallback_language)
            .finish()
    }
}

/// Script-ratio gate applied to locally decoded text.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Unicode ranges counted as "target script". Default: Hebrew.
    pub script_ranges: Vec<ScriptRange>,

    /// Minimum ratio of target-script characters. Default: 0.2.
    pub acceptance_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            script_ranges: vec![HEBREW],
            acceptance_threshold: 0.2,
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn async_job_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.async_job.api_key = Some(key.into());
        self
    }

    pub fn async_job_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.async_job.base_url = Some(url.into());
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.async_job.upload_timeout_secs = secs;
        self
    }

    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.async_job.poll_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.async_job.poll_interval_ms = ms;
        self
    }

    pub fn job_deadline_ms(mut self, ms: u64) -> Self {
        self.config.async_job.job_deadline_ms = ms;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.local.library_path = Some(path.into());
        self
    }

    pub fn decode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.local.decode_timeout_secs = secs;
        self
    }

    pub fn ocr_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.ocr.api_key = Some(key.into());
        self
    }

    pub fn ocr_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr.base_url = url.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr.timeout_secs = secs;
        self
    }

    pub fn ocr_fallback_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr.fallback_language = lang.into();
        self
    }

    pub fn script_ranges(mut self, ranges: Vec<ScriptRange>) -> Self {
        self.config.quality.script_ranges = ranges;
        self
    }

    pub fn acceptance_threshold(mut self, t: f64) -> Self {
        self.config.quality.acceptance_threshold = t;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ExtractionObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Blank credentials are normalised to `None` so that an exported but
    /// empty environment variable disables a backend instead of sending an
    /// empty key.
    pub fn build(mut self) -> Result<ExtractionConfig, ExtractError> {
        blank_to_none(&mut self.config.async_job.api_key);
        blank_to_none(&mut self.config.async_job.base_url);
        blank_to_none(&mut self.config.ocr.api_key);

        let c = &self.config;
        let t = c.quality.acceptance_threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ExtractError::InvalidConfig(format!(
                "Acceptance threshold must be 0.0–1.0, got {t}"
            )));
        }
        if c.quality.script_ranges.is_empty() {
            return Err(ExtractError::InvalidConfig(
                "At least one script range is required".into(),
            ));
        }
        if let Some(r) = c.quality.script_ranges.iter().find(|r| r.start > r.end) {
            return Err(ExtractError::InvalidConfig(format!(
                "Script range {r} has start > end"
            )));
        }
        if c.async_job.poll_interval_ms == 0 {
            return Err(ExtractError::InvalidConfig(
                "Poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.async_job.job_deadline_ms == 0 {
            return Err(ExtractError::InvalidConfig(
                "Job deadline must be ≥ 1ms".into(),
            ));
        }
        if c.async_job.upload_timeout_secs == 0
            || c.async_job.poll_timeout_secs == 0
            || c.ocr.timeout_secs == 0
            || c.local.decode_timeout_secs == 0
        {
            return Err(ExtractError::InvalidConfig(
                "Per-call timeouts must be ≥ 1s".into(),
            ));
        }
        if c.ocr.base_url.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "OCR base URL must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

fn non_blank(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn blank_to_none(v: &mut Option<String>) {
    if !non_blank(v) {
        *v = None;
    }
}

fn redact(v: &Option<String>) -> Option<&'static str> {
    v.as_ref().map(|_| "<redacted>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_provider_contracts() {
        let c = ExtractionConfig::default();
        assert_eq!(c.async_job.poll_interval(), Duration::from_millis(1500));
        assert_eq!(c.async_job.job_deadline(), Duration::from_secs(120));
        assert_eq!(c.async_job.poll_timeout(), Duration::from_secs(15));
        assert_eq!(c.ocr.timeout(), Duration::from_secs(30));
        assert_eq!(c.ocr.fallback_language, "eng");
        assert_eq!(c.quality.acceptance_threshold, 0.2);
        assert_eq!(c.quality.script_ranges, vec![HEBREW]);
    }

    #[test]
    fn no_credentials_by_default() {
        let c = ExtractionConfig::builder().build().unwrap();
        assert!(!c.async_job.is_configured());
        assert!(!c.ocr.is_configured());
    }

    #[test]
    fn async_job_needs_key_and_url() {
        let only_key = ExtractionConfig::builder()
            .async_job_api_key("llx-test")
            .build()
            .unwrap();
        assert!(!only_key.async_job.is_configured());

        let both = ExtractionConfig::builder()
            .async_job_api_key("llx-test")
            .async_job_base_url("http://127.0.0.1:9/api")
            .build()
            .unwrap();
        assert!(both.async_job.is_configured());
    }

    #[test]
    fn blank_credentials_are_dropped() {
        let c = ExtractionConfig::builder()
            .ocr_api_key("   ")
            .async_job_api_key("")
            .build()
            .unwrap();
        assert_eq!(c.ocr.api_key, None);
        assert_eq!(c.async_job.api_key, None);
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let err = ExtractionConfig::builder()
            .acceptance_threshold(1.5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("threshold"), "got: {err}");
    }

    #[test]
    fn inverted_script_range_rejected() {
        let err = ExtractionConfig::builder()
            .script_ranges(vec![ScriptRange::new('\u{05FF}', '\u{0590}')])
            .build()
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn zero_poll_interval_rejected() {
        assert!(ExtractionConfig::builder()
            .poll_interval_ms(0)
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let c = ExtractionConfig::builder()
            .ocr_api_key("K-super-secret")
            .async_job_api_key("llx-super-secret")
            .async_job_base_url("https://parse.example/api")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
        assert!(dbg.contains("parse.example"));
    }
}
