//! HTTP upload endpoint (feature `server`).
//!
//! `POST /parse-pdf` takes a multipart body with the PDF in a `file` or
//! `pdf` field and answers with the `ExtractText` JSON shape:
//!
//! | Status | Body |
//! |--------|------|
//! | 200 | `{"success":true,"text":…,"pages":…}` (text may be empty) |
//! | 400 | `{"success":false,"error":"No PDF file provided"}` |
//! | 413 | `{"success":false,"error":"PDF file too large"}` |
//! | 500 | `{"success":false,"error":"Failed to parse PDF"}` |
//!
//! All requests share one [`Extractor`], and with it the PDFium decoder.

use crate::document::Document;
use crate::error::ExtractError;
use crate::extract::Extractor;
use crate::output::ExtractTextResponse;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default request body ceiling.
pub const DEFAULT_UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

/// Multipart field names accepted for the document.
const FILE_FIELDS: [&str; 2] = ["file", "pdf"];

/// Router with the default upload limit.
pub fn router(extractor: Arc<Extractor>) -> Router {
    router_with_limit(extractor, DEFAULT_UPLOAD_LIMIT)
}

pub fn router_with_limit(extractor: Arc<Extractor>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/parse-pdf", post(parse_pdf))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(extractor)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(
    addr: SocketAddr,
    extractor: Arc<Extractor>,
    max_upload_bytes: usize,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router_with_limit(extractor, max_upload_bytes)).await
}

async fn health() -> &'static str {
    "ok"
}

type Reply = (StatusCode, Json<ExtractTextResponse>);

async fn parse_pdf(
    State(extractor): State<Arc<Extractor>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Reply {
    let document = match multipart {
        Ok(m) => read_document(m).await,
        Err(e) => {
            warn!("Upload is not multipart: {}", e);
            Err(ExtractError::NoDocument)
        }
    };

    let result = match document {
        Ok(doc) => extractor.extract_guarded(doc).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(r) => (StatusCode::OK, Json(r.into())),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("Request failed: {}", e);
            }
            (status, Json(ExtractTextResponse::from(&e)))
        }
    }
}

fn status_for(err: &ExtractError) -> StatusCode {
    match err {
        ExtractError::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A multipart read failure: over the body limit, or a malformed upload.
fn upload_error(context: &str, err: MultipartError) -> ExtractError {
    warn!("{}: {}", context, err);
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ExtractError::UploadTooLarge
    } else {
        ExtractError::NoDocument
    }
}

/// The first non-empty `file`/`pdf` field as a document.
async fn read_document(mut multipart: Multipart) -> Result<Document, ExtractError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => return Err(ExtractError::NoDocument),
            Err(e) => return Err(upload_error("Failed to read multipart field", e)),
        };

        let name = field.name().unwrap_or("").to_string();
        if !FILE_FIELDS.contains(&name.as_str()) {
            debug!("Ignoring multipart field '{}'", name);
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let content_type = field.content_type().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error("Failed to read file data", e))?;
        if bytes.is_empty() {
            continue;
        }

        debug!(
            "Received '{}' in field '{}' ({} bytes, {})",
            filename,
            name,
            bytes.len(),
            content_type
        );
        return Ok(Document::new(bytes.to_vec(), filename, content_type));
    }
}
