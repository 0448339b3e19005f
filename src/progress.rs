//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline runs each stage.
//!
//! Callers can forward events to a channel, a log, or a terminal progress
//! bar without the library knowing how the host communicates. The trait is
//! `Send + Sync` because [`crate::stream::convert_stream`] runs several
//! documents at once and shares one callback between them.
//!
//! # Example
//!
//! ```rust
//! use papermd::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, name: &str, order: usize, total_stages: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("stage {}/{} ({}) done", order, total_stages, name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline orchestrator as it runs each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `order` is 1-based.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first stage runs.
    fn on_conversion_start(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called just before a stage runs.
    fn on_stage_start(&self, name: &str, order: usize, total_stages: usize) {
        let _ = (name, order, total_stages);
    }

    /// Called when a stage finishes without error.
    fn on_stage_complete(&self, name: &str, order: usize, total_stages: usize) {
        let _ = (name, order, total_stages);
    }

    /// Called when a stage fails. The pipeline continues regardless.
    fn on_stage_error(&self, name: &str, order: usize, total_stages: usize, error: &str) {
        let _ = (name, order, total_stages, error);
    }

    /// Called once after the last stage (or after the scanned-PDF
    /// short-circuit).
    ///
    /// * `stages_run`      : stages that actually ran
    /// * `stages_succeeded`: stages that ran without error
    fn on_conversion_complete(&self, stages_run: usize, stages_succeeded: usize) {
        let _ = (stages_run, stages_succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _name: &str, _order: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _name: &str, _order: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _name: &str, _order: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_complete(&self, _run: usize, succeeded: usize) {
            self.succeeded.store(succeeded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start(12);
        cb.on_stage_start("extract-text", 1, 12);
        cb.on_stage_complete("extract-text", 1, 12);
        cb.on_stage_error("selective-ocr", 4, 12, "tesseract missing");
        cb.on_conversion_complete(12, 11);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
        };

        tracker.on_stage_start("extract-text", 1, 3);
        tracker.on_stage_complete("extract-text", 1, 3);
        tracker.on_stage_start("extract-tables", 2, 3);
        tracker.on_stage_error("extract-tables", 2, 3, "boom");
        tracker.on_stage_start("assemble", 3, 3);
        tracker.on_stage_complete("assemble", 3, 3);
        tracker.on_conversion_complete(3, 2);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.succeeded.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversion_start(10);
        cb.on_stage_start("assemble", 5, 10);
    }
}
