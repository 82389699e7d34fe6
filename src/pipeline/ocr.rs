//! OCR fallback via an OCR.space-compatible `/parse/image` endpoint.
//!
//! Up to three calls per document, one per entry of [`parameter_sets`].
//! The next set is tried only when the provider reports a processing error
//! together with an error message; a transport failure ends the backend
//! immediately.

use super::{file_part, transport_error, ExtractionBackend};
use crate::config::OcrConfig;
use crate::document::Document;
use crate::error::{BackendError, ExtractError};
use crate::output::{BackendKind, ExtractionAttempt};
use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

const KIND: BackendKind = BackendKind::Ocr;

/// One engine/language combination sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrParams {
    /// Short name used in logs.
    pub label: &'static str,
    /// `OCREngine` form field.
    pub engine: &'static str,
    /// `language` form field; omitted when `None`.
    pub language: Option<String>,
}

/// The ordered parameter sets: engine 1 with provider defaults, engine 2
/// with automatic language detection, then engine 1 pinned to `fallback`.
pub fn parameter_sets(fallback: &str) -> [OcrParams; 3] {
    [
        OcrParams {
            label: "default",
            engine: "1",
            language: None,
        },
        OcrParams {
            label: "auto-language",
            engine: "2",
            language: Some("auto".to_string()),
        },
        OcrParams {
            label: "fallback-language",
            engine: "1",
            language: Some(fallback.to_string()),
        },
    ]
}

/// The subset of the provider's response we read.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OcrResponse {
    pub is_errored_on_processing: bool,
    pub error_message: Option<ErrorMessage>,
    pub parsed_results: Option<Vec<ParsedResult>>,
}

/// `ErrorMessage` arrives either as a string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    fn joined(&self) -> String {
        match self {
            ErrorMessage::One(s) => s.clone(),
            ErrorMessage::Many(v) => v.join("; "),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ParsedResult {
    pub parsed_text: Option<String>,
}

impl OcrResponse {
    /// Parsed fragments joined with a blank line, trimmed.
    pub fn text(&self) -> String {
        self.fragments()
            .iter()
            .map(|r| r.parsed_text.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\n\n")
            .trim()
            .to_string()
    }

    /// Number of parsed fragments; the page count of the attempt.
    pub fn pages(&self) -> usize {
        self.fragments().len()
    }

    /// A processing error worth retrying with the next parameter set:
    /// the flag is set and the provider said why.
    pub fn is_retryable(&self) -> bool {
        self.is_errored_on_processing && self.error_text().is_some()
    }

    fn fragments(&self) -> &[ParsedResult] {
        self.parsed_results.as_deref().unwrap_or(&[])
    }

    fn error_text(&self) -> Option<String> {
        self.error_message
            .as_ref()
            .map(ErrorMessage::joined)
            .filter(|s| !s.trim().is_empty())
    }

    fn error_detail(&self) -> String {
        self.error_text()
            .unwrap_or_else(|| "processing error".to_string())
    }
}

/// Tier 3: OCR with engine and language fallbacks.
pub struct OcrBackend {
    client: Client,
    config: OcrConfig,
}

impl OcrBackend {
    pub fn new(config: &OcrConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/parse/image", self.config.base_url.trim_end_matches('/'))
    }

    /// One call with one parameter set.
    async fn call(
        &self,
        api_key: &str,
        document: &Document,
        params: &OcrParams,
    ) -> Result<OcrResponse, BackendError> {
        let mut form = Form::new()
            .part("file", file_part(document))
            .text("apikey", api_key.to_string())
            .text("OCREngine", params.engine)
            .text("filetype", "PDF")
            .text("detectOrientation", "true")
            .text("isTable", "false")
            .text("scale", "true");
        if let Some(lang) = &params.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .client
            .post(self.endpoint())
            .multipart(form)
            .timeout(self.config.timeout())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport_error(KIND, e))?;

        response
            .json::<OcrResponse>()
            .await
            .map_err(|e| transport_error(KIND, e))
    }
}

#[async_trait]
impl ExtractionBackend for OcrBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    async fn extract(&self, document: &Document) -> ExtractionAttempt {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return ExtractionAttempt::failed(
                KIND,
                BackendError::Unavailable {
                    backend: KIND,
                    reason: "no OCR API key configured".into(),
                },
            );
        };

        let mut last: Option<OcrResponse> = None;
        for params in parameter_sets(&self.config.fallback_language) {
            info!(
                "OCR attempt '{}' (engine {}, language {})",
                params.label,
                params.engine,
                params.language.as_deref().unwrap_or("default")
            );
            let response = match self.call(api_key, document, &params).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("OCR attempt '{}' failed: {}", params.label, e);
                    return ExtractionAttempt::failed(KIND, e);
                }
            };

            if !response.is_retryable() {
                last = Some(response);
                break;
            }
            warn!(
                "OCR attempt '{}' reported a processing error: {}",
                params.label,
                response.error_detail()
            );
            last = Some(response);
        }

        let Some(response) = last else {
            return ExtractionAttempt::inconclusive(KIND, BackendError::NoText { backend: KIND });
        };

        let text = response.text();
        debug!("OCR: {} fragments, {} chars", response.pages(), text.chars().count());
        if !text.is_empty() {
            ExtractionAttempt::succeeded(KIND, text, response.pages())
        } else if response.is_errored_on_processing {
            ExtractionAttempt::failed(
                KIND,
                BackendError::ProviderRejected {
                    backend: KIND,
                    detail: response.error_detail(),
                },
            )
        } else {
            // Blank fragments still count as pages.
            let mut attempt =
                ExtractionAttempt::inconclusive(KIND, BackendError::NoText { backend: KIND });
            attempt.pages = response.pages();
            attempt
        }
    }
}
