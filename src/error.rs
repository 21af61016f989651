//! Error types for the docpipe library.
//!
//! The harness is an all-or-nothing acceptance check, so there is a single
//! fatal error type, [`PipelineError`]. Every stage returns it and the
//! driver stops at the first one it sees. Variants are grouped by the
//! stage that raises them so a failed run points straight at the service
//! that misbehaved.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docpipe library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source document was not found at the given path.
    #[error("Source document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the source document.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The extraction service reported an `error` status for the job.
    #[error("Extraction failed for job '{job_ref}': {detail}")]
    ExtractionFailed { job_ref: String, detail: String },

    /// The poll loop used its whole attempt budget without completing.
    #[error(
        "Extraction of job '{job_ref}' did not complete within {max_attempts} polls \
         ({received}/{total} pages received)"
    )]
    PollBudgetExceeded {
        job_ref: String,
        max_attempts: u32,
        received: usize,
        total: usize,
    },

    // ── Anonymization errors ──────────────────────────────────────────────
    /// The anonymization service embedded an error marker in its log.
    #[error("Anonymization failed: {detail}")]
    AnonymizationFailed { detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// The token exchange did not yield an access token.
    #[error("Authentication failed for user '{user}': {detail}")]
    AuthFailed { user: String, detail: String },

    /// The data service answered with a result other than `ok`.
    #[error("Upload rejected by data service: result = '{result}'")]
    UploadFailed { result: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// Connection refused, DNS failure, timeout and other transport faults.
    #[error("Request to {service} failed ({url}): {reason}")]
    Transport {
        service: &'static str,
        url: String,
        reason: String,
    },

    /// The service answered with a non-success HTTP status.
    #[error("{service} responded with HTTP {status} ({url}): {body}")]
    HttpStatus {
        service: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The body could not be decoded, or decoded into something unexpected.
    #[error("Invalid response from {service}: {detail}")]
    InvalidResponse {
        service: &'static str,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Name of the pipeline stage the error belongs to, for reports.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::FileNotFound { .. } | PipelineError::PermissionDenied { .. } => "input",
            PipelineError::ExtractionFailed { .. } | PipelineError::PollBudgetExceeded { .. } => {
                "extract"
            }
            PipelineError::AnonymizationFailed { .. } => "anonymize",
            PipelineError::AuthFailed { .. } => "auth",
            PipelineError::UploadFailed { .. } => "upload",
            PipelineError::Transport { service, .. }
            | PipelineError::HttpStatus { service, .. }
            | PipelineError::InvalidResponse { service, .. } => *service,
            PipelineError::InvalidConfig(_) => "config",
            PipelineError::Internal(_) => "internal",
        }
    }
}
