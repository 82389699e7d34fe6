//! HTTP backends against in-process fake providers.
//!
//! Each test binds an axum app to `127.0.0.1:0` and points the backend's
//! base URL at it. Poll intervals and deadlines are shrunk through the
//! config so the suite stays fast.

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_waterfall::config::ExtractionConfig;
use pdf_waterfall::pipeline::async_job::AsyncJobBackend;
use pdf_waterfall::pipeline::ocr::OcrBackend;
use pdf_waterfall::{AttemptOutcome, BackendError, Document, ExtractionBackend};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn doc() -> Document {
    Document::pdf(b"%PDF-1.4\n%fake\n".to_vec(), "scan.pdf")
}

// ── Fake parsing-job provider ────────────────────────────────────────────

#[derive(Clone)]
struct JobProvider {
    upload_reply: Value,
    status_replies: Arc<Vec<Value>>,
    uploads: Arc<AtomicUsize>,
    polls: Arc<AtomicUsize>,
    auth: Arc<Mutex<Option<String>>>,
    /// How long each status request takes to answer.
    status_delay: Duration,
}

impl JobProvider {
    fn new(upload_reply: Value, status_replies: Vec<Value>) -> Self {
        Self {
            upload_reply,
            status_replies: Arc::new(status_replies),
            uploads: Arc::new(AtomicUsize::new(0)),
            polls: Arc::new(AtomicUsize::new(0)),
            auth: Arc::new(Mutex::new(None)),
            status_delay: Duration::ZERO,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    fn app(&self) -> Router {
        Router::new()
            .route("/api/parsing/upload", post(job_upload))
            .route("/api/parsing/jobs/:id", get(job_status))
            .with_state(self.clone())
    }
}

async fn job_upload(
    State(p): State<JobProvider>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Json<Value> {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let _ = field.bytes().await.unwrap();
    }
    p.uploads.fetch_add(1, Ordering::SeqCst);
    *p.auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    Json(p.upload_reply.clone())
}

/// Replies in order; the last reply repeats forever.
async fn job_status(State(p): State<JobProvider>, Path(id): Path<String>) -> Json<Value> {
    assert_eq!(id, "job-7");
    tokio::time::sleep(p.status_delay).await;
    let n = p.polls.fetch_add(1, Ordering::SeqCst);
    let idx = n.min(p.status_replies.len() - 1);
    Json(p.status_replies[idx].clone())
}

fn job_config(base: &str) -> ExtractionConfig {
    ExtractionConfig::builder()
        .async_job_api_key("test-key")
        .async_job_base_url(format!("{base}/api"))
        .poll_interval_ms(10)
        .poll_timeout_secs(2)
        .job_deadline_ms(2_000)
        .build()
        .unwrap()
}

#[tokio::test]
async fn job_succeeds_after_a_few_polls() {
    let provider = JobProvider::new(
        json!({"id": "job-7", "status": "PENDING"}),
        vec![
            json!({"status": "PENDING"}),
            json!({"status": "PENDING"}),
            json!({"status": "SUCCESS", "pages": [{"text": "עמוד א"}, {"text": "עמוד ב"}]}),
        ],
    );
    let base = spawn(provider.app()).await;
    let backend = AsyncJobBackend::new(&job_config(&base).async_job).unwrap();

    let attempt = backend.extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Succeeded);
    assert_eq!(attempt.text, "עמוד א\n\nעמוד ב");
    assert_eq!(provider.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(provider.polls.load(Ordering::SeqCst), 3);
    assert_eq!(
        provider.auth.lock().unwrap().as_deref(),
        Some("Bearer test-key")
    );
}

#[tokio::test]
async fn nested_job_id_and_result_text_are_found() {
    let provider = JobProvider::new(
        json!({"job": {"id": "job-7"}}),
        vec![json!({"state": "completed", "result": {"text": "  from result  "}})],
    );
    let base = spawn(provider.app()).await;
    let backend = AsyncJobBackend::new(&job_config(&base).async_job).unwrap();

    let attempt = backend.extract(&doc()).await;
    assert_eq!(attempt.text, "from result");
}

#[tokio::test]
async fn job_that_never_finishes_times_out() {
    let provider = JobProvider::new(json!({"id": "job-7"}), vec![json!({"status": "PENDING"})]);
    let base = spawn(provider.app()).await;
    let config = ExtractionConfig::builder()
        .async_job_api_key("test-key")
        .async_job_base_url(format!("{base}/api"))
        .poll_interval_ms(20)
        .job_deadline_ms(200)
        .build()
        .unwrap();
    let backend = AsyncJobBackend::new(&config.async_job).unwrap();

    let started = std::time::Instant::now();
    let attempt = backend.extract(&doc()).await;
    let elapsed = started.elapsed();

    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    assert!(attempt.text.is_empty());
    match attempt.error {
        Some(BackendError::JobTimeout {
            ref job_id,
            ref last_state,
            ..
        }) => {
            assert_eq!(job_id, "job-7");
            assert_eq!(last_state, "PENDING");
        }
        other => panic!("expected JobTimeout, got {other:?}"),
    }
    assert!(provider.polls.load(Ordering::SeqCst) >= 2);
    assert!(elapsed < std::time::Duration::from_secs(2), "took {elapsed:?}");
}

#[tokio::test]
async fn slow_status_request_is_cut_off_by_the_deadline() {
    let provider = JobProvider::new(
        json!({"id": "job-7"}),
        vec![json!({"status": "SUCCESS", "text": "late"})],
    )
    .slow(Duration::from_millis(800));
    let base = spawn(provider.app()).await;
    let config = ExtractionConfig::builder()
        .async_job_api_key("test-key")
        .async_job_base_url(format!("{base}/api"))
        .poll_interval_ms(10)
        .poll_timeout_secs(15)
        .job_deadline_ms(300)
        .build()
        .unwrap();
    let backend = AsyncJobBackend::new(&config.async_job).unwrap();

    let started = std::time::Instant::now();
    let attempt = backend.extract(&doc()).await;
    let elapsed = started.elapsed();

    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    assert!(attempt.text.is_empty());
    match attempt.error {
        Some(BackendError::JobTimeout {
            ref last_state,
            deadline_ms,
            ..
        }) => {
            assert_eq!(last_state, "submitted");
            assert_eq!(deadline_ms, 300);
        }
        other => panic!("expected JobTimeout, got {other:?}"),
    }
    assert!(elapsed < Duration::from_millis(750), "took {elapsed:?}");
}

#[tokio::test]
async fn failed_job_is_rejected_without_further_polls() {
    let provider = JobProvider::new(json!({"id": "job-7"}), vec![json!({"status": "ERROR"})]);
    let base = spawn(provider.app()).await;
    let backend = AsyncJobBackend::new(&job_config(&base).async_job).unwrap();

    let attempt = backend.extract(&doc()).await;
    assert!(matches!(
        attempt.error,
        Some(BackendError::ProviderRejected { .. })
    ));
    assert_eq!(provider.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn succeeded_job_without_text_is_inconclusive() {
    let provider = JobProvider::new(
        json!({"id": "job-7"}),
        vec![json!({"status": "SUCCEEDED", "pages": []})],
    );
    let base = spawn(provider.app()).await;
    let backend = AsyncJobBackend::new(&job_config(&base).async_job).unwrap();

    let attempt = backend.extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Inconclusive);
    assert!(!attempt.has_text());
}

#[tokio::test]
async fn synchronous_upload_reply_skips_polling() {
    let provider = JobProvider::new(json!({"text": "inline text"}), vec![json!({})]);
    let base = spawn(provider.app()).await;
    let backend = AsyncJobBackend::new(&job_config(&base).async_job).unwrap();

    let attempt = backend.extract(&doc()).await;
    assert_eq!(attempt.text, "inline text");
    assert_eq!(provider.polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_job_provider_is_a_transport_failure() {
    // Bind, then drop, to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend =
        AsyncJobBackend::new(&job_config(&format!("http://{addr}")).async_job).unwrap();
    let attempt = backend.extract(&doc()).await;
    assert!(matches!(attempt.error, Some(BackendError::Transport { .. })));
}

// ── Fake OCR provider ────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct OcrProvider {
    /// Form fields of every call, in order.
    calls: Arc<Mutex<Vec<HashMap<String, String>>>>,
    /// Calls that answer with a processing error before succeeding.
    errors_before_success: usize,
    /// From call `n` (1-based) on, answer with this HTTP status.
    status_from: Option<(usize, u16)>,
    /// Processing errors carry no `ErrorMessage`.
    silent_errors: bool,
    /// Successful calls return fragments with no text.
    blank_pages: bool,
}

impl OcrProvider {
    fn app(&self) -> Router {
        Router::new()
            .route("/parse/image", post(ocr_parse))
            .with_state(self.clone())
    }

    fn calls(&self) -> Vec<HashMap<String, String>> {
        self.calls.lock().unwrap().clone()
    }
}

async fn ocr_parse(
    State(p): State<OcrProvider>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let bytes = field.bytes().await.unwrap();
            fields.insert(name, format!("{} bytes", bytes.len()));
        } else {
            fields.insert(name, field.text().await.unwrap());
        }
    }
    let n = {
        let mut calls = p.calls.lock().unwrap();
        calls.push(fields);
        calls.len()
    };

    if let Some((_, code)) = p.status_from.filter(|(from, _)| n >= *from) {
        return (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"error": "boom"})),
        );
    }
    if n <= p.errors_before_success {
        let message = if p.silent_errors {
            Value::Null
        } else {
            json!([format!("engine failure {n}")])
        };
        return (
            StatusCode::OK,
            Json(json!({
                "IsErroredOnProcessing": true,
                "ErrorMessage": message,
                "ParsedResults": null
            })),
        );
    }
    if p.blank_pages {
        return (
            StatusCode::OK,
            Json(json!({
                "IsErroredOnProcessing": false,
                "ParsedResults": [{"ParsedText": ""}, {"ParsedText": " \r\n"}, {}]
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "IsErroredOnProcessing": false,
            "ParsedResults": [
                {"ParsedText": format!("attempt {n} page 1")},
                {"ParsedText": format!("attempt {n} page 2")}
            ]
        })),
    )
}

fn ocr_backend(base: &str) -> OcrBackend {
    let config = ExtractionConfig::builder()
        .ocr_api_key("ocr-key")
        .ocr_base_url(base)
        .ocr_fallback_language("heb")
        .build()
        .unwrap();
    OcrBackend::new(&config.ocr).unwrap()
}

#[tokio::test]
async fn ocr_first_attempt_success_makes_one_call() {
    let provider = OcrProvider::default();
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.text, "attempt 1 page 1\n\nattempt 1 page 2");
    assert_eq!(attempt.pages, 2);

    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    let first = &calls[0];
    assert_eq!(first["apikey"], "ocr-key");
    assert_eq!(first["OCREngine"], "1");
    assert_eq!(first["filetype"], "PDF");
    assert_eq!(first["detectOrientation"], "true");
    assert_eq!(first["isTable"], "false");
    assert_eq!(first["scale"], "true");
    assert!(!first.contains_key("language"));
    assert_eq!(first["file"], format!("{} bytes", doc().len()));
}

#[tokio::test]
async fn ocr_retries_through_all_three_parameter_sets() {
    let provider = OcrProvider {
        errors_before_success: 2,
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Succeeded);
    assert_eq!(attempt.text, "attempt 3 page 1\n\nattempt 3 page 2");

    let calls = provider.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1]["OCREngine"], "2");
    assert_eq!(calls[1]["language"], "auto");
    assert_eq!(calls[2]["OCREngine"], "1");
    assert_eq!(calls[2]["language"], "heb");
}

#[tokio::test]
async fn ocr_gives_up_after_three_processing_errors() {
    let provider = OcrProvider {
        errors_before_success: 10,
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    match attempt.error {
        Some(BackendError::ProviderRejected { ref detail, .. }) => {
            assert!(detail.contains("engine failure 3"), "{detail}");
        }
        other => panic!("expected ProviderRejected, got {other:?}"),
    }
    assert_eq!(provider.calls().len(), 3);
}

#[tokio::test]
async fn ocr_http_error_aborts_retries() {
    let provider = OcrProvider {
        status_from: Some((1, 503)),
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    assert!(attempt.text.is_empty());
    assert!(matches!(attempt.error, Some(BackendError::Transport { .. })));
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn ocr_transport_failure_mid_retry_stops_the_walk() {
    let provider = OcrProvider {
        errors_before_success: 1,
        status_from: Some((2, 502)),
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    assert!(attempt.text.is_empty());
    assert!(matches!(attempt.error, Some(BackendError::Transport { .. })));
    assert_eq!(provider.calls().len(), 2);
}

#[tokio::test]
async fn ocr_error_without_message_is_not_retried() {
    let provider = OcrProvider {
        errors_before_success: 10,
        silent_errors: true,
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Failed);
    match attempt.error {
        Some(BackendError::ProviderRejected { ref detail, .. }) => {
            assert_eq!(detail, "processing error");
        }
        other => panic!("expected ProviderRejected, got {other:?}"),
    }
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn ocr_blank_pages_keep_their_count() {
    let provider = OcrProvider {
        blank_pages: true,
        ..Default::default()
    };
    let base = spawn(provider.app()).await;

    let attempt = ocr_backend(&base).extract(&doc()).await;
    assert_eq!(attempt.outcome, AttemptOutcome::Inconclusive);
    assert!(attempt.text.is_empty());
    assert_eq!(attempt.pages, 3);
    assert_eq!(provider.calls().len(), 1);
}
