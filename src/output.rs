//! Values handed from stage to stage, and the final run report.

use serde::Serialize;

/// The extracted document, ready for anonymization.
///
/// Produced by [`crate::pipeline::extract::Extractor::await_completion`]
/// and moved into the next stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledText {
    /// Job reference the text was polled from.
    pub job_ref: String,
    /// Page fragments in page order, or the consolidated text verbatim.
    pub text: String,
    /// Page count announced by the last `meta` status (0 if none).
    pub total_pages: usize,
    /// Distinct pages received (forced to `total_pages` by a `text` status).
    pub received_pages: usize,
    /// Status polls used, including the final one.
    pub attempts: u32,
    /// The service reported OCR work for this document.
    pub ocr: bool,
    /// The document arrived as one consolidated `text` status.
    pub consolidated: bool,
    /// Number of `meta` statuses seen. Anything above 1 is unexpected.
    pub meta_observations: u32,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Content hash assigned by the data service.
    pub hash: String,
    /// Where the stored document can be fetched.
    pub url: String,
}

/// Summary of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub job_ref: String,
    pub total_pages: usize,
    pub poll_attempts: u32,
    pub ocr: bool,
    pub consolidated: bool,
    /// Byte length of the extracted text.
    pub extracted_len: usize,
    /// Byte length of the text that was (or would have been) uploaded.
    pub final_len: usize,
    pub anonymized: bool,
    pub dry_run: bool,
    /// `None` in dry-run mode.
    pub upload: Option<UploadReceipt>,
    pub total_duration_ms: u64,
    /// The text as it left the last stage that ran.
    #[serde(skip)]
    pub final_text: String,
}
