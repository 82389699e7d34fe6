//! Cloud parsing job backend: upload, then poll until the job finishes.
//!
//! ## Protocol
//!
//! ```text
//! POST {base}/parsing/upload      multipart file, bearer auth
//!   → {id | job.id | job_id}      (or, rarely, the text itself)
//! GET  {base}/parsing/jobs/{id}   bearer auth, every poll_interval
//!   → {state|status, text|output|result.*|pages[]|documents[]}
//! ```
//!
//! ## Deadline
//!
//! The job deadline is wall-clock time from submission, not a poll count:
//! a slow status call eats into the same budget as the sleeps between
//! calls. Each status call is capped both by its own timeout and by the
//! time left before the deadline. When the deadline passes the job is
//! abandoned locally; nothing is cancelled on the provider side.

use super::{file_part, preview, transport_error, ExtractionBackend};
use crate::config::AsyncJobConfig;
use crate::document::Document;
use crate::error::{BackendError, ExtractError};
use crate::output::{BackendKind, ExtractionAttempt};
use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

const KIND: BackendKind = BackendKind::AsyncJob;

/// Lifecycle of a parsing job as seen by the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    /// Map a provider status string onto a state. Unknown or missing
    /// statuses count as still running.
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => JobState::Succeeded,
            "FAILED" | "ERROR" => JobState::Failed,
            "CANCELLED" | "CANCELED" => JobState::Cancelled,
            _ => JobState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Submitted => "submitted",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A submitted job, owned by one polling loop.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub id: String,
    pub state: JobState,
    /// Status string exactly as last reported by the provider.
    pub last_status: String,
    pub created_at: Instant,
    pub deadline: Instant,
    pub polls: u32,
}

impl ExtractionJob {
    pub fn new(id: impl Into<String>, budget: Duration) -> Self {
        let created_at = Instant::now();
        Self {
            id: id.into(),
            state: JobState::Submitted,
            last_status: String::new(),
            created_at,
            deadline: created_at + budget,
            polls: 0,
        }
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        (now < self.deadline).then(|| self.deadline - now)
    }
}

// ── Response probing ─────────────────────────────────────────────────────

/// Pulls one candidate value out of a provider response.
type Probe = fn(&Value) -> Option<String>;

/// Where a job id may live, in priority order.
const JOB_ID_PROBES: [(&str, Probe); 3] = [
    ("id", top_level_id),
    ("job.id", nested_job_id),
    ("job_id", snake_job_id),
];

/// Where text may live in an upload response that carried no job id.
const IMMEDIATE_TEXT_PROBES: [(&str, Probe); 2] = [("text", flat_text), ("output", flat_output)];

/// Where text may live in a finished job, in priority order.
const JOB_TEXT_PROBES: [(&str, Probe); 6] = [
    ("text", flat_text),
    ("output", flat_output),
    ("result.text", result_text),
    ("result.output", result_output),
    ("pages[].text", page_texts),
    ("documents[].text", document_texts),
];

/// First probe that yields a value, with the name of the field it hit.
fn first_match(value: &Value, probes: &[(&'static str, Probe)]) -> Option<(&'static str, String)> {
    probes
        .iter()
        .find_map(|(name, probe)| probe(value).map(|v| (*name, v)))
}

/// Job id from an upload response.
pub fn job_id(response: &Value) -> Option<String> {
    first_match(response, &JOB_ID_PROBES).map(|(_, id)| id)
}

/// Text from an upload response that carried no job id.
pub fn immediate_text(response: &Value) -> Option<String> {
    first_match(response, &IMMEDIATE_TEXT_PROBES).map(|(_, text)| text)
}

/// Text from a finished job's status payload, trimmed.
pub fn job_text(status: &Value) -> Option<String> {
    first_match(status, &JOB_TEXT_PROBES).map(|(field, text)| {
        debug!("Job text found in '{}'", field);
        text
    })
}

/// `state`, falling back to `status`.
pub fn job_status(status: &Value) -> String {
    ["state", "status"]
        .iter()
        .find_map(|k| status.get(*k).and_then(scalar_to_string))
        .unwrap_or_default()
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_blank(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Join `items[].field` (first present field wins per item) with a blank
/// line. Items without the field contribute an empty string.
fn joined(v: &Value, items: &str, fields: &[&str]) -> Option<String> {
    let arr = v.get(items)?.as_array()?;
    let parts: Vec<&str> = arr
        .iter()
        .map(|item| {
            fields
                .iter()
                .find_map(|f| item.get(*f).and_then(Value::as_str).filter(|s| !s.is_empty()))
                .unwrap_or("")
        })
        .collect();
    let text = parts.join("\n\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn top_level_id(v: &Value) -> Option<String> {
    v.get("id").and_then(scalar_to_string)
}

fn nested_job_id(v: &Value) -> Option<String> {
    v.get("job")?.get("id").and_then(scalar_to_string)
}

fn snake_job_id(v: &Value) -> Option<String> {
    v.get("job_id").and_then(scalar_to_string)
}

fn flat_text(v: &Value) -> Option<String> {
    non_blank(v.get("text"))
}

fn flat_output(v: &Value) -> Option<String> {
    non_blank(v.get("output"))
}

fn result_text(v: &Value) -> Option<String> {
    non_blank(v.get("result")?.get("text"))
}

fn result_output(v: &Value) -> Option<String> {
    non_blank(v.get("result")?.get("output"))
}

fn page_texts(v: &Value) -> Option<String> {
    joined(v, "pages", &["text"])
}

fn document_texts(v: &Value) -> Option<String> {
    joined(v, "documents", &["text", "content"])
}

// ── Backend ──────────────────────────────────────────────────────────────

/// Tier 1: cloud parsing job.
pub struct AsyncJobBackend {
    client: Client,
    config: AsyncJobConfig,
}

impl AsyncJobBackend {
    pub fn new(config: &AsyncJobConfig) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn base_url(&self) -> Option<&str> {
        self.config
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/'))
    }

    fn upload_url(base: &str) -> String {
        format!("{base}/parsing/upload")
    }

    fn job_url(base: &str, id: &str) -> String {
        format!("{base}/parsing/jobs/{id}")
    }

    /// Phase 1: upload the document, return the provider's JSON reply.
    async fn submit(&self, document: &Document, base: &str, key: &str) -> Result<Value, BackendError> {
        let form = Form::new().part("file", file_part(document));
        let response = self
            .client
            .post(Self::upload_url(base))
            .bearer_auth(key)
            .multipart(form)
            .timeout(self.config.upload_timeout())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport_error(KIND, e))?;

        let body: Value = response.json().await.map_err(|e| transport_error(KIND, e))?;
        debug!("Upload response (preview): {}", preview(&body, 1500));
        Ok(body)
    }

    /// One status request, capped by `timeout`.
    async fn fetch_status(&self, url: &str, key: &str, timeout: Duration) -> Result<Value, BackendError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(key)
            .timeout(timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| transport_error(KIND, e))?;
        response.json().await.map_err(|e| transport_error(KIND, e))
    }

    /// Phase 2: poll until the job is terminal or the deadline passes.
    async fn poll(&self, job: &mut ExtractionJob, base: &str, key: &str) -> ExtractionAttempt {
        let url = Self::job_url(base, &job.id);
        let interval = self.config.poll_interval();

        while let Some(remaining) = job.remaining() {
            let timeout = self.config.poll_timeout().min(remaining);
            let status = match self.fetch_status(&url, key, timeout).await {
                Ok(status) => status,
                // A poll cut short by the deadline is a timeout, not a
                // transport problem.
                Err(_) if job.remaining().is_none() => break,
                Err(e) => {
                    warn!("Job {}: status request failed: {}", job.id, e);
                    return ExtractionAttempt::failed(KIND, e);
                }
            };

            job.polls += 1;
            job.last_status = job_status(&status);
            job.state = JobState::from_status(&job.last_status);
            debug!(
                "Job {}: poll {} state={} ({})",
                job.id,
                job.polls,
                job.state,
                preview(&status, 2000)
            );

            match job.state {
                JobState::Succeeded => {
                    return match job_text(&status) {
                        Some(text) => {
                            info!(
                                "Job {} succeeded after {} polls, {} chars",
                                job.id,
                                job.polls,
                                text.chars().count()
                            );
                            ExtractionAttempt::succeeded(KIND, text, 0)
                        }
                        None => {
                            warn!("Job {} succeeded without any text field", job.id);
                            ExtractionAttempt::inconclusive(KIND, BackendError::NoText { backend: KIND })
                        }
                    };
                }
                JobState::Failed | JobState::Cancelled => {
                    warn!("Job {} ended without success (state={})", job.id, job.last_status);
                    return ExtractionAttempt::failed(
                        KIND,
                        BackendError::ProviderRejected {
                            backend: KIND,
                            detail: format!("job {} ended in state {}", job.id, job.last_status),
                        },
                    );
                }
                JobState::Submitted | JobState::Running => {}
            }

            match job.remaining() {
                Some(left) => sleep(interval.min(left)).await,
                None => break,
            }
        }

        let last_state = if job.last_status.is_empty() {
            job.state.to_string()
        } else {
            job.last_status.clone()
        };
        warn!(
            "Job {} abandoned after {}ms ({} polls, last state {})",
            job.id,
            self.config.job_deadline_ms,
            job.polls,
            last_state
        );
        ExtractionAttempt::failed(
            KIND,
            BackendError::JobTimeout {
                backend: KIND,
                job_id: job.id.clone(),
                last_state,
                deadline_ms: self.config.job_deadline_ms,
            },
        )
    }
}

#[async_trait]
impl ExtractionBackend for AsyncJobBackend {
    fn kind(&self) -> BackendKind {
        KIND
    }

    fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    async fn extract(&self, document: &Document) -> ExtractionAttempt {
        let (Some(key), Some(base)) = (self.config.api_key.as_deref(), self.base_url()) else {
            return ExtractionAttempt::failed(
                KIND,
                BackendError::Unavailable {
                    backend: KIND,
                    reason: "no API key or base URL configured".into(),
                },
            );
        };

        info!("Submitting '{}' ({} bytes) to parsing job", document.filename(), document.len());
        let submitted = match self.submit(document, base, key).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Parsing job upload failed: {}", e);
                return ExtractionAttempt::failed(KIND, e);
            }
        };

        let Some(id) = job_id(&submitted) else {
            // No job: some API versions answer synchronously.
            return match immediate_text(&submitted) {
                Some(text) => {
                    info!("Upload returned text directly ({} chars)", text.chars().count());
                    ExtractionAttempt::succeeded(KIND, text, 0)
                }
                None => {
                    warn!("Upload response carried neither a job id nor text");
                    ExtractionAttempt::failed(KIND, BackendError::NoText { backend: KIND })
                }
            };
        };

        let mut job = ExtractionJob::new(id, self.config.job_deadline());
        self.poll(&mut job, base, key).await
    }
}
