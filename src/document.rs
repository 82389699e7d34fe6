//! The input value handed to every backend.

use std::fmt;
use std::sync::Arc;

/// Content type every backend declares when uploading the document.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Filename used when the caller did not supply one.
pub const DEFAULT_FILENAME: &str = "document.pdf";

/// An uploaded PDF: raw bytes plus the metadata the providers want to see.
///
/// Immutable once built. The bytes sit behind an `Arc` so each backend (and
/// each OCR retry) can hand an owned copy of the handle to `reqwest` or a
/// blocking task without cloning the buffer itself.
#[derive(Clone)]
pub struct Document {
    bytes: Arc<[u8]>,
    filename: String,
    content_type: String,
}

impl Document {
    /// Build a document. An empty filename falls back to
    /// [`DEFAULT_FILENAME`], an empty content type to [`PDF_CONTENT_TYPE`].
    pub fn new(
        bytes: impl Into<Arc<[u8]>>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let content_type = content_type.into();
        Self {
            bytes: bytes.into(),
            filename: if filename.trim().is_empty() {
                DEFAULT_FILENAME.to_string()
            } else {
                filename
            },
            content_type: if content_type.trim().is_empty() {
                PDF_CONTENT_TYPE.to_string()
            } else {
                content_type
            },
        }
    }

    /// Shorthand for a PDF with the default content type.
    pub fn pdf(bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        Self::new(bytes, filename, PDF_CONTENT_TYPE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A cheap shared handle on the byte buffer.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` when the buffer starts with the `%PDF` magic bytes.
    pub fn has_pdf_magic(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}
