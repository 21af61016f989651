//! Progress-callback trait for pipeline milestones.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the run moves through its stages and as the extraction job is
//! polled. The CLI uses it to drive a spinner; tests use it to count polls.
//!
//! # Example
//!
//! ```rust
//! use docpipe::{PipelineConfig, PipelineProgress};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct PollCounter(AtomicU32);
//!
//! impl PipelineProgress for PollCounter {
//!     fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("poll {attempt}/{max_attempts}: {status}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .dry_run(true)
//!     .progress_callback(Arc::new(PollCounter(AtomicU32::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The sequential stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Anonymize,
    Authenticate,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Anonymize => "anonymize",
            Stage::Authenticate => "authenticate",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Called by the pipeline as it makes progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The run is strictly sequential, so events arrive
/// in order, but implementations must still be `Send + Sync` to be shared
/// through the config.
pub trait PipelineProgress: Send + Sync {
    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when the extraction service hands out a job reference.
    fn on_job_submitted(&self, job_ref: &str) {
        let _ = job_ref;
    }

    /// Called after every status poll.
    ///
    /// # Arguments
    /// * `attempt`     : 1-indexed poll number
    /// * `max_attempts`: poll budget
    /// * `status`      : status tag returned by the service
    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &str) {
        let _ = (attempt, max_attempts, status);
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once when the run aborts.
    fn on_failure(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgress>;
