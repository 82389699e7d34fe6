//! CLI binary for pdf-waterfall.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, then either extracts one document or serves the
//! upload endpoint.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_waterfall::extract::write_atomic;
use pdf_waterfall::input::load_document;
use pdf_waterfall::{
    BackendKind, ExtractTextResponse, ExtractionAttempt, ExtractionConfig, ExtractionObserver,
    ExtractionResult, Extractor,
};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner driven by the observer hook ──────────────────────────────────

/// Shows which tier is running and logs one line per finished attempt.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.set_message("reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionObserver for CliObserver {
    fn on_backend_start(&self, backend: BackendKind) {
        self.bar.set_message(format!("trying {backend}"));
    }

    fn on_backend_skipped(&self, backend: BackendKind) {
        self.bar
            .println(format!("  {} {:<10} {}", dim("–"), backend, dim("not configured")));
    }

    fn on_attempt(&self, attempt: &ExtractionAttempt) {
        let line = match &attempt.error {
            None if attempt.has_text() => format!(
                "  {} {:<10} {}",
                green("✓"),
                attempt.backend,
                dim(&format!("{} chars, {} pages", attempt.text.chars().count(), attempt.pages))
            ),
            None => format!("  {} {:<10} {}", red("✗"), attempt.backend, dim("no text")),
            Some(e) => {
                let msg = e.to_string();
                let msg = match msg.char_indices().nth(80) {
                    Some((idx, _)) => format!("{}\u{2026}", &msg[..idx]),
                    None => msg,
                };
                format!("  {} {:<10} {}", red("✗"), attempt.backend, red(&msg))
            }
        };
        self.bar.println(line);
    }

    fn on_quality_rejected(&self, backend: BackendKind, ratio: f64) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            red("✗"),
            backend,
            red(&format!("rejected, script ratio {ratio:.3}"))
        ));
    }

    fn on_complete(&self, result: &ExtractionResult) {
        self.bar.finish_and_clear();
        match result.backend {
            Some(kind) => eprintln!(
                "{} {} chars via {}",
                green("✔"),
                bold(&result.text.chars().count().to_string()),
                kind
            ),
            None => eprintln!("{} no text found", dim("∅")),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract to stdout
  pdf-waterfall scan.pdf

  # Extract to a file
  pdf-waterfall scan.pdf -o scan.txt

  # From a URL, print the JSON response shape
  pdf-waterfall --json https://example.org/scan.pdf

  # Serve POST /parse-pdf
  pdf-waterfall --serve 0.0.0.0:5000

ENVIRONMENT VARIABLES:
  PARSE_JOB_API_KEY           Async parsing service key (tier 1 disabled when unset)
  PARSE_JOB_BASE_URL          Async parsing service base URL, including /api
  OCR_SPACE_API_KEY           OCR.space key (tier 3 disabled when unset)
  OCR_SPACE_BASE_URL          OCR endpoint base (default https://api.ocr.space)
  OCR_FALLBACK_LANGUAGE       Language for the last OCR attempt (default eng)
  PDFIUM_LIB_PATH             Path to libpdfium or the directory holding it
  PDF_WATERFALL_THRESHOLD     Minimum Hebrew ratio for local text (default 0.2)
  PDF_WATERFALL_JOB_DEADLINE  Async job deadline in seconds (default 120)
  RUST_LOG                    Override log filtering
"#;

/// Extract text from PDFs through a cloud job, local decode and OCR fallback.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-waterfall",
    version,
    about = "Extract text from PDFs via async job, local decode and OCR fallback",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "serve")]
    input: Option<String>,

    /// Serve the upload endpoint on this address instead of extracting.
    #[arg(long, value_name = "ADDR", conflicts_with = "input")]
    serve: Option<SocketAddr>,

    /// Write text to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the `{success, text, pages}` JSON response instead of text.
    #[arg(long)]
    json: bool,

    #[arg(long, env = "PARSE_JOB_API_KEY", hide_env_values = true)]
    parse_job_api_key: Option<String>,

    #[arg(long, env = "PARSE_JOB_BASE_URL")]
    parse_job_base_url: Option<String>,

    /// Async job deadline in seconds, measured from submission.
    #[arg(long, env = "PDF_WATERFALL_JOB_DEADLINE", default_value_t = 120)]
    job_deadline: u64,

    #[arg(long, env = "OCR_SPACE_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,

    #[arg(long, env = "OCR_SPACE_BASE_URL")]
    ocr_base_url: Option<String>,

    #[arg(long, env = "OCR_FALLBACK_LANGUAGE", default_value = "eng")]
    ocr_fallback_language: String,

    /// Path to libpdfium, or a directory containing it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Minimum fraction of Hebrew characters for local text to be accepted.
    #[arg(long, env = "PDF_WATERFALL_THRESHOLD", default_value_t = 0.2)]
    threshold: f64,

    /// Maximum upload size in MiB for `--serve`.
    #[arg(long, default_value_t = 25)]
    max_upload_mb: usize,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs unless -v asks for them.
    let show_progress =
        cli.serve.is_none() && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer.clone())?;
    let extractor = Arc::new(Extractor::new(&config).context("Failed to set up extractor")?);

    // ── Server mode ──────────────────────────────────────────────────────
    if let Some(addr) = cli.serve {
        pdf_waterfall::server::serve(addr, extractor, upload_limit(cli.max_upload_mb))
            .await
            .with_context(|| format!("Server on {addr} failed"))?;
        return Ok(());
    }

    // ── Single document ──────────────────────────────────────────────────
    let input = cli.input.as_deref().unwrap_or_default();
    let outcome = match load_document(input, cli.download_timeout).await {
        Ok(doc) => extractor.extract_guarded(doc).await,
        Err(e) => Err(e),
    };
    if let (Err(_), Some(o)) = (&outcome, &observer) {
        o.bar.finish_and_clear();
    }

    if cli.json {
        let response = match &outcome {
            Ok(r) => ExtractTextResponse::success(r.text.clone(), r.pages),
            Err(e) => ExtractTextResponse::from(e),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
    }
    let result = outcome.with_context(|| format!("Extraction failed for '{input}'"))?;

    if let Some(ref path) = cli.output {
        write_atomic(path, &result.text)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    } else if !cli.json {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.text.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !show_progress && !cli.json {
        match result.backend {
            Some(kind) => eprintln!("Extracted {} pages via {}", result.pages, kind),
            None => eprintln!("No text found"),
        }
    }

    Ok(())
}

/// `--max-upload-mb` in bytes, clamped instead of overflowing.
fn upload_limit(mb: usize) -> usize {
    mb.saturating_mul(1024 * 1024)
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .job_deadline_ms(cli.job_deadline.saturating_mul(1000))
        .ocr_fallback_language(cli.ocr_fallback_language.clone())
        .acceptance_threshold(cli.threshold);

    if let Some(ref key) = cli.parse_job_api_key {
        builder = builder.async_job_api_key(key.clone());
    }
    if let Some(ref url) = cli.parse_job_base_url {
        builder = builder.async_job_base_url(url.clone());
    }
    if let Some(ref key) = cli.ocr_api_key {
        builder = builder.ocr_api_key(key.clone());
    }
    if let Some(ref url) = cli.ocr_base_url {
        builder = builder.ocr_base_url(url.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_library_path(path.clone());
    }
    if let Some(o) = observer {
        builder = builder.observer(o);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_limit_in_bytes() {
        assert_eq!(upload_limit(25), 25 * 1024 * 1024);
        assert_eq!(upload_limit(usize::MAX), usize::MAX);
    }
}
