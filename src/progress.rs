//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the executor completes each stage.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docai::{PipelineProgressCallback, PipelineConfig, StageProgress};
//! use std::sync::Arc;
//!
//! struct PrintingCallback;
//!
//! impl PipelineProgressCallback for PrintingCallback {
//!     fn on_stage_complete(&self, progress: StageProgress) {
//!         eprintln!("{} done ({:.0}%)", progress.stage, progress.percent());
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(PrintingCallback))
//!     .build()
//!     .unwrap();
//! ```

use crate::graph::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Position of the run after a stage completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: Stage,
    /// Stages completed so far, including `stage`.
    pub completed: usize,
    /// Stages in this run.
    pub total: usize,
}

impl StageProgress {
    /// `completed / total` in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.completed as f64 / self.total as f64
    }

    /// [`Self::fraction`] scaled to a percentage for display.
    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

/// Called by the executor as it advances through the stage graph.
///
/// Stages execute strictly one at a time, so calls never overlap within a
/// run. All methods have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the entry stage runs.
    fn on_run_start(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called just before a stage runs.
    ///
    /// # Arguments
    /// * `stage`: the stage about to run
    /// * `index`: its zero-based position in this run
    /// * `total`: stages in this run
    fn on_stage_start(&self, stage: Stage, index: usize, total: usize) {
        let _ = (stage, index, total);
    }

    /// Called after a stage's update has been merged into the state.
    fn on_stage_complete(&self, progress: StageProgress) {
        let _ = progress;
    }

    /// Called once after the last stage completed.
    fn on_run_complete(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called when a stage fails; the run is over.
    fn on_run_failed(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
#[derive(Debug, Default)]
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        fractions: Mutex<Vec<f64>>,
        failed: Mutex<Option<Stage>>,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: Stage, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, progress: StageProgress) {
            self.fractions.lock().unwrap().push(progress.fraction());
        }

        fn on_run_failed(&self, stage: Stage, _error: &str) {
            *self.failed.lock().unwrap() = Some(stage);
        }
    }

    #[test]
    fn fraction_and_percent() {
        let p = StageProgress {
            stage: Stage::CropTables,
            completed: 3,
            total: 12,
        };
        assert!((p.fraction() - 0.25).abs() < f64::EPSILON);
        assert!((p.percent() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn zero_total_is_zero_fraction() {
        let p = StageProgress {
            stage: Stage::SplitPdf,
            completed: 0,
            total: 0,
        };
        assert_eq!(p.fraction(), 0.0);
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(13);
        cb.on_stage_start(Stage::SplitPdf, 0, 13);
        cb.on_stage_complete(StageProgress {
            stage: Stage::SplitPdf,
            completed: 1,
            total: 13,
        });
        cb.on_run_failed(Stage::AnalyzeLayout, "boom");
        cb.on_run_complete(13);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_start(Stage::MergeImages, 0, 2);
        tracker.on_stage_complete(StageProgress {
            stage: Stage::MergeImages,
            completed: 1,
            total: 2,
        });
        tracker.on_stage_start(Stage::AnalyzeLayout, 1, 2);
        tracker.on_run_failed(Stage::AnalyzeLayout, "HTTP 500");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(*tracker.fractions.lock().unwrap(), vec![0.5]);
        assert_eq!(*tracker.failed.lock().unwrap(), Some(Stage::AnalyzeLayout));
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(14);
    }
}
