//! # docpipe
//!
//! End-to-end acceptance harness for a document-processing service chain:
//! extraction, anonymization, authentication and storage.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Extract    POST /extract/, then poll /extract/status until complete
//!  ├─ 2. Anonymize  POST /run with the algorithm pipeline
//!  ├─ 3. Auth       POST /token (password grant)
//!  └─ 4. Upload     POST /create → content hash
//! ```
//!
//! Every stage is a single request except extraction, which is an
//! asynchronous job polled through a bounded state machine (see
//! [`pipeline::extract`]). Any failure ends the run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpipe::{run_pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .anon_api("http://127.0.0.1:5011")
//!         .auth_api("http://127.0.0.1:5015")
//!         .data_api("http://127.0.0.1:5010")
//!         .credentials("tester", "secret")
//!         .build()?;
//!     let report = run_pipeline("misc/test_fr_7.pdf", &config).await?;
//!     eprintln!("{} pages in {} polls", report.total_pages, report.poll_attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpipe` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod protocol;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, PollPolicy, TextCompletion, UploadDefaults};
pub use error::PipelineError;
pub use output::{AssembledText, PipelineReport, UploadReceipt};
pub use pipeline::extract::{
    Delay, ExtractionService, Extractor, HttpExtractionService, JobRef, NoDelay, PollState,
    PollStep, TokioDelay,
};
pub use pipeline::input::SourceDocument;
pub use pipeline::upload::AuthToken;
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback, Stage};
pub use protocol::{AlgorithmStep, ExtractionMeta, ExtractionStatus, PageFragment};
pub use run::{extract_only, run_pipeline, Pipeline};
