//! Progress-callback trait for per-job ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as jobs move through the pipeline stages.
//!
//! # Example
//!
//! ```rust
//! use folio_ingest::{IngestConfig, IngestProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     stages: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for StageCounter {
//!     fn on_stage(&self, identifier: &str, stage: Stage) {
//!         self.stages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{identifier}: {stage}");
//!     }
//! }
//!
//! let counter = Arc::new(StageCounter { stages: AtomicUsize::new(0) });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::Stage;
use std::sync::Arc;

/// Called by the pipeline as documents are ingested.
///
/// Implementations must be `Send + Sync`: jobs run concurrently on blocking
/// workers and may report at the same time. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before any job starts.
    ///
    /// # Arguments
    /// * `total_inputs`: number of inputs accepted for ingestion
    fn on_batch_start(&self, total_inputs: usize) {
        let _ = total_inputs;
    }

    /// Called when a parser has been chosen for an input.
    ///
    /// # Arguments
    /// * `identifier`: the input path, or `original[start-end]` for a part
    /// * `parser`: name of the selected parser
    fn on_job_start(&self, identifier: &str, parser: &str) {
        let _ = (identifier, parser);
    }

    /// Called as a job enters each stage.
    fn on_stage(&self, identifier: &str, stage: Stage) {
        let _ = (identifier, stage);
    }

    /// Called when a job finishes successfully.
    ///
    /// # Arguments
    /// * `identifier`: as in [`on_job_start`](Self::on_job_start)
    /// * `page_count`: pages in the finished document
    fn on_job_complete(&self, identifier: &str, page_count: usize) {
        let _ = (identifier, page_count);
    }

    /// Called when a job fails.
    fn on_job_error(&self, identifier: &str, error: &str) {
        let _ = (identifier, error);
    }

    /// Called once after every job has been attempted.
    ///
    /// # Arguments
    /// * `total_inputs`: inputs attempted
    /// * `success_count`: inputs that produced at least one document
    fn on_batch_complete(&self, total_inputs: usize, success_count: usize) {
        let _ = (total_inputs, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<Stage>>,
        batch_success: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_job_start(&self, _identifier: &str, _parser: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage(&self, _identifier: &str, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_job_complete(&self, _identifier: &str, _page_count: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_error(&self, _identifier: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total_inputs: usize, success_count: usize) {
            self.batch_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_job_start("a.pdf", "PDFDoc");
        cb.on_stage("a.pdf", Stage::PageImages);
        cb.on_job_complete("a.pdf", 3);
        cb.on_job_error("b.pdf", "no parser");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_job_start("scan.tiff", "ScanDoc");
        tracker.on_stage("scan.tiff", Stage::CopyOriginal);
        tracker.on_stage("scan.tiff", Stage::Fingerprint);
        tracker.on_job_complete("scan.tiff", 4);
        tracker.on_job_start("x.bin", "TextDoc");
        tracker.on_job_error("x.bin", "convert-to-pdf timed out");
        tracker.on_batch_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::CopyOriginal, Stage::Fingerprint]
        );
        assert_eq!(tracker.batch_success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn IngestProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_stage("doc", Stage::Done);
    }
}
