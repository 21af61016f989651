//! Extraction: submit the document, then poll the job until it completes.
//!
//! The extraction service works asynchronously. Submission returns a job
//! reference at once; the text then trickles out through repeated status
//! polls, each answering with exactly one of:
//!
//! ```text
//! error  ──▶ fail now, no further polls
//! meta   ──▶ page count + OCR flag          ─┐
//! page   ──▶ one page of text at an index    ├─▶ poll again
//! text   ──▶ whole document in one piece    ─┘   (or finish, see TextCompletion)
//! empty  ──▶ nothing new: finish if received == total, else poll again
//! ```
//!
//! Completion is only ever detected on an `empty` status (by default), so a
//! job that keeps streaming pages or text is bounded by the attempt budget
//! alone. The state machine lives in [`PollState`] and is pure; the
//! [`Extractor`] drives it against an [`ExtractionService`] with a
//! [`Delay`] between polls. Both seams are traits so tests can script the
//! statuses and skip the waiting.

use crate::client::ServiceClient;
use crate::config::{PollPolicy, TextCompletion};
use crate::error::PipelineError;
use crate::output::AssembledText;
use crate::pipeline::input::SourceDocument;
use crate::progress::ProgressCallback;
use crate::protocol::{ExtractionMeta, ExtractionStatus, PageFragment, RawStatus, SubmitResponse};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Multipart field the extraction service reads the document from.
const UPLOAD_FIELD: &str = "rawFile";

/// Opaque handle on one extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRef(String);

impl JobRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Seams ────────────────────────────────────────────────────────────────

/// The two calls the extraction service offers.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Upload the document and start a job.
    async fn submit(&self, document: SourceDocument) -> Result<JobRef, PipelineError>;

    /// Fetch the next status of a job.
    async fn poll(&self, job: &JobRef) -> Result<ExtractionStatus, PipelineError>;
}

/// Waits between polls.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real waiting on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Does not wait at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

/// [`ExtractionService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpExtractionService {
    client: ServiceClient,
    base_url: String,
}

impl HttpExtractionService {
    pub fn new(client: ServiceClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn submit(&self, document: SourceDocument) -> Result<JobRef, PipelineError> {
        let url = format!("{}/extract/", self.base_url);
        let (file_name, bytes) = document.into_parts();
        let part = Part::bytes(bytes).file_name(file_name);
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response: SubmitResponse = self.client.post_multipart("extract", &url, form).await?;
        Ok(JobRef::new(response.job_ref))
    }

    async fn poll(&self, job: &JobRef) -> Result<ExtractionStatus, PipelineError> {
        let url = format!("{}/extract/status", self.base_url);
        let raw: RawStatus = self
            .client
            .get_json("extract", &url, &[("ref", job.as_str())])
            .await?;
        ExtractionStatus::from_raw(raw)
    }
}

// ── Page buffer ──────────────────────────────────────────────────────────

/// Index-addressed accumulator of page text.
///
/// Pages are keyed by index and never pre-sized, so indices and counts
/// announced by the service cost nothing until text actually arrives.
#[derive(Debug, Default)]
pub struct PageBuffer {
    meta: Option<ExtractionMeta>,
    meta_observations: u32,
    pages: BTreeMap<usize, String>,
    received: usize,
    consolidated: Option<String>,
}

impl PageBuffer {
    /// Announced page count, 0 until a `meta` status arrives.
    pub fn total_pages(&self) -> usize {
        self.meta.map(|m| m.total_pages).unwrap_or(0)
    }

    pub fn received_pages(&self) -> usize {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total_pages()
    }

    fn record_meta(&mut self, meta: ExtractionMeta) {
        self.meta_observations += 1;
        if self.meta_observations > 1 {
            warn!(
                "Metadata received again (observation {}): {} pages replaces {}",
                self.meta_observations,
                meta.total_pages,
                self.total_pages()
            );
        }
        self.meta = Some(meta);
    }

    /// Store a page. Returns `false` if the index was already written.
    fn write_page(&mut self, fragment: PageFragment) -> bool {
        let PageFragment { page, text } = fragment;
        if self.meta.is_some() && page >= self.total_pages() {
            warn!(
                "Page {} is outside the announced {} pages",
                page,
                self.total_pages()
            );
        }
        if self.pages.contains_key(&page) {
            warn!("Page {} received twice; keeping the first copy", page);
            return false;
        }
        self.pages.insert(page, text);
        self.received += 1;
        true
    }

    fn set_consolidated(&mut self, text: String) {
        if self.consolidated.is_some() {
            warn!("Consolidated text received twice; keeping the latest");
        }
        self.consolidated = Some(text);
        self.received = self.total_pages();
    }

    /// The document text: consolidated text wins, otherwise pages in order.
    fn assemble(&self) -> String {
        if let Some(ref text) = self.consolidated {
            return text.clone();
        }
        self.pages.values().map(String::as_str).collect()
    }
}

// ── State machine ────────────────────────────────────────────────────────

/// What the poll loop should do after a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Complete,
}

/// Client-side state of one extraction job.
#[derive(Debug)]
pub struct PollState {
    job_ref: JobRef,
    text_completion: TextCompletion,
    buffer: PageBuffer,
}

impl PollState {
    pub fn new(job_ref: JobRef, text_completion: TextCompletion) -> Self {
        Self {
            job_ref,
            text_completion,
            buffer: PageBuffer::default(),
        }
    }

    pub fn buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    /// Fold one status into the state.
    pub fn apply(&mut self, status: ExtractionStatus) -> Result<PollStep, PipelineError> {
        match status {
            ExtractionStatus::Error(detail) => {
                error!("Extraction of job {} failed: {}", self.job_ref, detail);
                Err(PipelineError::ExtractionFailed {
                    job_ref: self.job_ref.to_string(),
                    detail,
                })
            }
            ExtractionStatus::Meta(meta) => {
                info!("Received meta, total pages expected: {}", meta.total_pages);
                if meta.ocr_in_progress {
                    info!("OCR operation ongoing");
                }
                self.buffer.record_meta(meta);
                Ok(PollStep::Continue)
            }
            ExtractionStatus::Page(fragment) => {
                debug!(
                    "Received page {} ({} bytes)",
                    fragment.page,
                    fragment.text.len()
                );
                self.buffer.write_page(fragment);
                Ok(PollStep::Continue)
            }
            ExtractionStatus::Text(text) => {
                info!("Received consolidated text ({} bytes)", text.len());
                self.buffer.set_consolidated(text);
                match self.text_completion {
                    TextCompletion::AwaitEmpty => Ok(PollStep::Continue),
                    TextCompletion::Immediate => Ok(PollStep::Complete),
                }
            }
            ExtractionStatus::Empty => {
                if self.buffer.is_complete() {
                    Ok(PollStep::Complete)
                } else {
                    debug!(
                        "No update yet: {}/{} pages",
                        self.buffer.received_pages(),
                        self.buffer.total_pages()
                    );
                    Ok(PollStep::Continue)
                }
            }
        }
    }

    /// Hand the text over once the loop has completed.
    pub fn finish(self, attempts: u32) -> AssembledText {
        let text = self.buffer.assemble();
        let buffer = self.buffer;
        AssembledText {
            job_ref: self.job_ref.0,
            text,
            total_pages: buffer.total_pages(),
            received_pages: buffer.received,
            attempts,
            ocr: buffer.meta.map(|m| m.ocr_in_progress).unwrap_or(false),
            consolidated: buffer.consolidated.is_some(),
            meta_observations: buffer.meta_observations,
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Runs the submit-then-poll protocol against an [`ExtractionService`].
pub struct Extractor {
    service: Arc<dyn ExtractionService>,
    delay: Arc<dyn Delay>,
    policy: PollPolicy,
    progress: Option<ProgressCallback>,
}

impl Extractor {
    /// An extractor that really waits between polls.
    pub fn new(service: Arc<dyn ExtractionService>, policy: PollPolicy) -> Self {
        Self {
            service,
            delay: Arc::new(TokioDelay),
            policy,
            progress: None,
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Upload the document. The document is consumed and its bytes dropped
    /// once the request completes.
    pub async fn submit(&self, document: SourceDocument) -> Result<JobRef, PipelineError> {
        let job = self.service.submit(document).await?;
        info!("Received Ref: {}", job);
        if let Some(ref cb) = self.progress {
            cb.on_job_submitted(job.as_str());
        }
        Ok(job)
    }

    /// Poll `job` until it completes, fails, or the budget runs out.
    pub async fn await_completion(&self, job: JobRef) -> Result<AssembledText, PipelineError> {
        let max_attempts = self.policy.max_attempts;
        let mut state = PollState::new(job.clone(), self.policy.text_completion);

        self.delay.wait(self.policy.initial_delay()).await;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                self.delay.wait(self.policy.interval()).await;
            }

            let status = self.service.poll(&job).await?;
            debug!("Poll {}/{}: {}", attempt, max_attempts, status.tag());
            if let Some(ref cb) = self.progress {
                cb.on_poll(attempt, max_attempts, status.tag());
            }

            if state.apply(status)? == PollStep::Complete {
                let assembled = state.finish(attempt);
                info!(
                    "Extraction complete after {} polls: {} pages, {} bytes",
                    attempt,
                    assembled.total_pages,
                    assembled.text.len()
                );
                return Ok(assembled);
            }
        }

        Err(PipelineError::PollBudgetExceeded {
            job_ref: job.to_string(),
            max_attempts,
            received: state.buffer().received_pages(),
            total: state.buffer().total_pages(),
        })
    }

    /// [`Self::submit`] followed by [`Self::await_completion`].
    pub async fn extract(&self, document: SourceDocument) -> Result<AssembledText, PipelineError> {
        let job = self.submit(document).await?;
        self.await_completion(job).await
    }
}
