//! Pipeline driver: extraction → anonymization → authentication → upload.
//!
//! Stages run strictly one after another; each stage's output is the next
//! one's input and the first error ends the run. There is no resumption
//! and no partial result.

use crate::client::ServiceClient;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::PipelineReport;
use crate::pipeline::anonymize::Anonymizer;
use crate::pipeline::extract::{Delay, ExtractionService, Extractor, HttpExtractionService, TokioDelay};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::upload::{Authenticator, Uploader};
use crate::progress::{ProgressCallback, Stage};
use crate::protocol::UploadRecord;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A configured pipeline, ready to run documents.
pub struct Pipeline {
    config: PipelineConfig,
    extraction: Arc<dyn ExtractionService>,
    delay: Arc<dyn Delay>,
    anonymizer: Anonymizer,
    authenticator: Authenticator,
    uploader: Uploader,
}

impl Pipeline {
    /// Wire every stage to the services named in `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = ServiceClient::new(config.request_timeout_secs)?;

        Ok(Self {
            extraction: Arc::new(HttpExtractionService::new(
                client.clone(),
                config.extract_url(),
            )),
            delay: Arc::new(TokioDelay),
            anonymizer: Anonymizer::new(
                client.clone(),
                config.anon_api.clone(),
                config.algorithms.clone(),
            ),
            authenticator: Authenticator::new(client.clone(), config.auth_api.clone()),
            uploader: Uploader::new(client, config.data_api.clone()),
            config,
        })
    }

    /// Replace the wait between polls (tests use [`crate::NoDelay`]).
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the extraction service.
    pub fn with_extraction_service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.extraction = service;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load `path` and run it through every stage.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<PipelineReport, PipelineError> {
        let document = SourceDocument::from_path(path).await?;
        self.run(document).await
    }

    /// Run `document` through every stage.
    pub async fn run(&self, document: SourceDocument) -> Result<PipelineReport, PipelineError> {
        let start = Instant::now();
        info!(
            "Starting run: {} ({} bytes)",
            document.file_name(),
            document.len()
        );

        // ── Step 1: Extract ──────────────────────────────────────────────
        let extractor = Extractor::new(Arc::clone(&self.extraction), self.config.poll)
            .with_delay(Arc::clone(&self.delay))
            .with_progress(self.config.progress_callback.clone());
        let assembled = self
            .stage(Stage::Extract, extractor.extract(document))
            .await?;
        let extracted_len = assembled.text.len();
        info!("Received data ({} bytes)", extracted_len);

        let mut report = PipelineReport {
            job_ref: assembled.job_ref,
            total_pages: assembled.total_pages,
            poll_attempts: assembled.attempts,
            ocr: assembled.ocr,
            consolidated: assembled.consolidated,
            extracted_len,
            final_len: 0,
            anonymized: false,
            dry_run: self.config.dry_run,
            upload: None,
            total_duration_ms: 0,
            final_text: String::new(),
        };

        // ── Step 2: Anonymize ────────────────────────────────────────────
        let text = if self.config.anonymise {
            let text = self
                .stage(Stage::Anonymize, self.anonymizer.anonymize(assembled.text))
                .await?;
            report.anonymized = true;
            text
        } else {
            info!("Anonymization disabled; keeping extracted text");
            assembled.text
        };
        report.final_len = text.len();

        // ── Step 3 & 4: Authenticate, upload ─────────────────────────────
        if self.config.dry_run {
            warn!("/!\\ This is a DRY-RUN /!\\ skipping authentication and upload");
            report.final_text = text;
        } else {
            let token = self
                .stage(
                    Stage::Authenticate,
                    self.authenticator.authenticate(
                        &self.config.api_user,
                        &self.config.api_pass,
                        &self.config.token_scope(),
                    ),
                )
                .await?;

            let record = UploadRecord::new(text, &self.config.upload_defaults);
            let receipt = self
                .stage(Stage::Upload, self.uploader.upload(token, &record))
                .await?;
            report.upload = Some(receipt);
            report.final_text = record.text;
        }

        report.total_duration_ms = start.elapsed().as_millis() as u64;
        info!("Run complete in {}ms", report.total_duration_ms);
        Ok(report)
    }

    async fn stage<T, F>(&self, stage: Stage, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        in_stage(self.config.progress_callback.as_ref(), stage, fut).await
    }
}

/// Await one stage, reporting start, completion or failure.
async fn in_stage<T, F>(
    progress: Option<&ProgressCallback>,
    stage: Stage,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    if let Some(cb) = progress {
        cb.on_stage_start(stage);
    }
    match fut.await {
        Ok(value) => {
            if let Some(cb) = progress {
                cb.on_stage_complete(stage);
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(cb) = progress {
                cb.on_failure(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

/// Run the file at `path` through a pipeline built from `config`.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use docpipe::{run_pipeline, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::builder()
///     .credentials("tester", "secret")
///     .build()?;
/// let report = run_pipeline("misc/test_fr_7.pdf", &config).await?;
/// if let Some(upload) = report.upload {
///     println!("{} → {}", upload.hash, upload.url);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    Pipeline::new(config.clone())?.run_file(path).await
}

/// Submit and poll only; returns the assembled text without touching the
/// anonymization or storage services.
pub async fn extract_only(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<crate::output::AssembledText, PipelineError> {
    let document = SourceDocument::from_path(path).await?;
    let client = ServiceClient::new(config.request_timeout_secs)?;
    let service = Arc::new(HttpExtractionService::new(client, config.extract_url()));
    let extractor =
        Extractor::new(service, config.poll).with_progress(config.progress_callback.clone());
    in_stage(
        config.progress_callback.as_ref(),
        Stage::Extract,
        extractor.extract(document),
    )
    .await
}
