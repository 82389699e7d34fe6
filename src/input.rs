//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! Every backend wants the raw bytes in memory (multipart upload, or a byte
//! slice for PDFium), so a URL is downloaded straight into a buffer and a
//! local file is read whole. The `%PDF` magic bytes are checked up front so
//! the CLI can report "not a PDF" instead of three confused backend logs.

use crate::document::{Document, DEFAULT_FILENAME, PDF_CONTENT_TYPE};
use crate::error::ExtractError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (local path or HTTP/HTTPS URL) into a document.
///
/// An empty file or body yields [`ExtractError::NoDocument`].
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, ExtractError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    }

    let document = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };

    if document.is_empty() {
        return Err(ExtractError::NoDocument);
    }
    if !document.has_pdf_magic() {
        return Err(ExtractError::NotAPdf {
            name: document.filename().to_string(),
            magic: document.bytes().iter().take(4).copied().collect(),
        });
    }
    Ok(document)
}

async fn read_local(path_str: &str) -> Result<Document, ExtractError> {
    let path = PathBuf::from(path_str);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => return Err(ExtractError::FileNotFound { path }),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Document::pdf(bytes, filename))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, ExtractError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let failed = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(failed)?;
    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.contains("pdf"))
        .unwrap_or(PDF_CONTENT_TYPE)
        .to_string();
    let bytes = response.bytes().await.map_err(failed)?;

    info!("Downloaded {} bytes", bytes.len());
    Ok(Document::new(bytes.to_vec(), filename_from_url(url), content_type))
}

/// Last path segment of `url` when it looks like a filename.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}
