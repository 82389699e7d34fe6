//! Output types: per-backend attempts, the final result, and the
//! `ExtractText` response shape.

use crate::error::{BackendError, ExtractError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which backend produced an attempt (or the final text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Cloud parsing job: upload, then poll until done.
    AsyncJob,
    /// In-process PDFium text decoding.
    Local,
    /// OCR service with engine / language fallbacks.
    Ocr,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::AsyncJob => "async-job",
            BackendKind::Local => "local",
            BackendKind::Ocr => "ocr",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single backend call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The backend did its job. The text may still be empty or, for the
    /// local decoder, rejected by the script-ratio check.
    Succeeded,
    /// The backend could not do its job (see the attached error).
    Failed,
    /// The provider claimed success but handed back nothing recognisable.
    Inconclusive,
}

/// What one backend produced for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub backend: BackendKind,
    pub outcome: AttemptOutcome,
    /// Extracted text, possibly empty.
    pub text: String,
    /// Page count, 0 when the backend does not know.
    pub pages: usize,
    pub error: Option<BackendError>,
}

impl ExtractionAttempt {
    pub fn succeeded(backend: BackendKind, text: impl Into<String>, pages: usize) -> Self {
        Self {
            backend,
            outcome: AttemptOutcome::Succeeded,
            text: text.into(),
            pages,
            error: None,
        }
    }

    pub fn failed(backend: BackendKind, error: BackendError) -> Self {
        Self {
            backend,
            outcome: AttemptOutcome::Failed,
            text: String::new(),
            pages: 0,
            error: Some(error),
        }
    }

    pub fn inconclusive(backend: BackendKind, error: BackendError) -> Self {
        Self {
            backend,
            outcome: AttemptOutcome::Inconclusive,
            text: String::new(),
            pages: 0,
            error: Some(error),
        }
    }

    /// `true` when the attempt succeeded with at least one non-whitespace
    /// character.
    pub fn has_text(&self) -> bool {
        self.outcome == AttemptOutcome::Succeeded && !self.text.trim().is_empty()
    }
}

/// The orchestrator's verdict for one document.
///
/// Always produced, even when every backend failed: that case is a result
/// with empty text and `backend: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub pages: usize,
    /// The backend whose text was accepted, `None` for the empty result.
    pub backend: Option<BackendKind>,
    /// Every backend that actually ran, in waterfall order.
    pub attempts: Vec<ExtractionAttempt>,
}

impl ExtractionResult {
    /// The terminal "no usable text found" result.
    pub fn empty(attempts: Vec<ExtractionAttempt>) -> Self {
        Self {
            text: String::new(),
            pages: 0,
            backend: None,
            attempts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// The `ExtractText` response shape.
///
/// Serialises to `{"success":true,"text":…,"pages":…}` or
/// `{"success":false,"error":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractTextResponse {
    Success {
        success: True,
        text: String,
        pages: usize,
    },
    Failure {
        success: False,
        error: String,
    },
}

impl ExtractTextResponse {
    pub fn success(text: impl Into<String>, pages: usize) -> Self {
        ExtractTextResponse::Success {
            success: True,
            text: text.into(),
            pages,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ExtractTextResponse::Failure {
            success: False,
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractTextResponse::Success { .. })
    }

    /// The extracted text, `None` for a failure.
    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractTextResponse::Success { text, .. } => Some(text),
            ExtractTextResponse::Failure { .. } => None,
        }
    }
}

impl From<ExtractionResult> for ExtractTextResponse {
    fn from(result: ExtractionResult) -> Self {
        ExtractTextResponse::success(result.text, result.pages)
    }
}

impl From<&ExtractError> for ExtractTextResponse {
    fn from(err: &ExtractError) -> Self {
        ExtractTextResponse::failure(err.wire_message())
    }
}

/// A `bool` that only (de)serialises as `true`.
///
/// Lets the untagged response enum pick its variant from the `success`
/// field instead of from whichever other fields happen to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct True;

/// A `bool` that only (de)serialises as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct False;

macro_rules! literal_bool {
    ($ty:ident, $value:literal) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                match bool::deserialize(d)? {
                    $value => Ok($ty),
                    other => Err(serde::de::Error::custom(format!(
                        "expected success={}, got {}",
                        $value, other
                    ))),
                }
            }
        }
    };
}

literal_bool!(True, true);
literal_bool!(False, false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_shape() {
        let r = ExtractTextResponse::success("שלום", 2);
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(v, serde_json::json!({"success": true, "text": "שלום", "pages": 2}));
    }

    #[test]
    fn failure_shape() {
        let r = ExtractTextResponse::from(&ExtractError::NoDocument);
        let v: serde_json::Value = serde_json::to_value(&r).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"success": false, "error": "No PDF file provided"})
        );
    }

    #[test]
    fn response_parses_back_by_success_flag() {
        let ok: ExtractTextResponse =
            serde_json::from_str(r#"{"success":true,"text":"","pages":0}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some(""));

        let bad: ExtractTextResponse =
            serde_json::from_str(r#"{"success":false,"error":"boom"}"#).unwrap();
        assert!(!bad.is_success());
    }

    #[test]
    fn empty_result_converts_to_successful_response() {
        let r: ExtractTextResponse = ExtractionResult::empty(vec![]).into();
        assert_eq!(r, ExtractTextResponse::success("", 0));
    }

    #[test]
    fn has_text_ignores_whitespace_and_failures() {
        assert!(!ExtractionAttempt::succeeded(BackendKind::Ocr, " \n\t", 1).has_text());
        assert!(ExtractionAttempt::succeeded(BackendKind::Ocr, "x", 1).has_text());
        let failed = ExtractionAttempt::failed(
            BackendKind::Ocr,
            BackendError::Transport {
                backend: BackendKind::Ocr,
                detail: "timeout".into(),
            },
        );
        assert!(!failed.has_text());
    }

    #[test]
    fn backend_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&BackendKind::AsyncJob).unwrap(),
            "\"async-job\""
        );
        assert_eq!(BackendKind::Local.to_string(), "local");
    }
}
