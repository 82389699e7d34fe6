//! Observer trait for per-tier extraction events.
//!
//! Inject an [`Arc<dyn ExtractionObserver>`] via
//! [`crate::config::ExtractionConfigBuilder::observer`] to be told which tier
//! is running, which tiers were skipped, and why text was rejected. The CLI
//! uses it to drive its spinner; a server can forward the events to metrics.
//!
//! # Example
//!
//! ```rust
//! use pdf_waterfall::{BackendKind, ExtractionConfig, ExtractionObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     started: AtomicUsize,
//! }
//!
//! impl ExtractionObserver for CountingObserver {
//!     fn on_backend_start(&self, _backend: BackendKind) {
//!         self.started.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .observer(Arc::new(CountingObserver { started: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BackendKind, ExtractionAttempt, ExtractionResult};
use std::sync::Arc;

/// Called by the orchestrator as it walks the waterfall.
///
/// Implementations must be `Send + Sync`: one extractor may serve many
/// requests at once. All methods default to no-ops.
pub trait ExtractionObserver: Send + Sync {
    /// A backend is about to be invoked.
    fn on_backend_start(&self, backend: BackendKind) {
        let _ = backend;
    }

    /// A backend was skipped because it is not configured.
    fn on_backend_skipped(&self, backend: BackendKind) {
        let _ = backend;
    }

    /// A backend returned.
    fn on_attempt(&self, attempt: &ExtractionAttempt) {
        let _ = attempt;
    }

    /// Locally decoded text was discarded by the script-ratio gate.
    fn on_quality_rejected(&self, backend: BackendKind, ratio: f64) {
        let _ = (backend, ratio);
    }

    /// The waterfall finished.
    fn on_complete(&self, result: &ExtractionResult) {
        let _ = result;
    }
}

/// A no-op observer; the default when none is configured.
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type SharedObserver = Arc<dyn ExtractionObserver>;
