//! Configuration types for a pipeline run.
//!
//! Everything a run needs (service locations, credentials, poll policy,
//! upload defaults) lives in one [`PipelineConfig`] value that is handed to
//! each stage's constructor. Nothing is read from the process environment
//! inside the library; the CLI maps environment variables onto the builder.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use crate::protocol::AlgorithmStep;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default base URL of the anonymization service (also hosts extraction).
pub const DEFAULT_ANON_API: &str = "http://127.0.0.1:5011";
/// Default base URL of the authentication service.
pub const DEFAULT_AUTH_API: &str = "http://127.0.0.1:5015";
/// Default base URL of the data-storage service.
pub const DEFAULT_DATA_API: &str = "http://127.0.0.1:5010";
/// Default host used to build the `host:<scope>` token scope.
pub const DEFAULT_SCOPE: &str = "localhost";

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use docpipe::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .anon_api("http://127.0.0.1:5011")
///     .credentials("tester", "secret")
///     .max_attempts(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.extract_url(), "http://127.0.0.1:5011");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Base URL of the extraction service. When `None`, extraction requests
    /// go to [`Self::anon_api`], which is how the services are usually
    /// deployed.
    pub extract_api: Option<String>,

    /// Base URL of the anonymization service.
    pub anon_api: String,

    /// Base URL of the authentication (token) service.
    pub auth_api: String,

    /// Base URL of the data-storage service.
    pub data_api: String,

    /// Account used for the password grant.
    pub api_user: String,

    /// Password used for the password grant. Never printed by `Debug`.
    pub api_pass: String,

    /// Host part of the requested token scope (`host:<scope>`).
    pub scope: String,

    /// Send the extracted text through the anonymization service. Default: true.
    ///
    /// When off, the assembled text is uploaded as extracted.
    pub anonymise: bool,

    /// Stop after anonymization: no token exchange, no upload. Default: false.
    pub dry_run: bool,

    /// Poll loop shape for the extraction job.
    pub poll: PollPolicy,

    /// Ordered anonymization passes sent with every `/run` request.
    pub algorithms: Vec<AlgorithmStep>,

    /// Values for the upload record fields the harness does not derive.
    pub upload_defaults: UploadDefaults,

    /// Optional per-request timeout in seconds. Default: none.
    ///
    /// The poll attempt budget is the only aggregate bound on a run.
    pub request_timeout_secs: Option<u64>,

    /// Optional observer notified at every milestone.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extract_api: None,
            anon_api: DEFAULT_ANON_API.to_string(),
            auth_api: DEFAULT_AUTH_API.to_string(),
            data_api: DEFAULT_DATA_API.to_string(),
            api_user: String::new(),
            api_pass: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            anonymise: true,
            dry_run: false,
            poll: PollPolicy::default(),
            algorithms: AlgorithmStep::default_pipeline(),
            upload_defaults: UploadDefaults::default(),
            request_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("extract_api", &self.extract_url())
            .field("anon_api", &self.anon_api)
            .field("auth_api", &self.auth_api)
            .field("data_api", &self.data_api)
            .field("api_user", &self.api_user)
            .field("api_pass", &"<redacted>")
            .field("scope", &self.scope)
            .field("anonymise", &self.anonymise)
            .field("dry_run", &self.dry_run)
            .field("poll", &self.poll)
            .field("algorithms", &self.algorithms)
            .field("upload_defaults", &self.upload_defaults)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgress>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Base URL extraction requests are sent to.
    pub fn extract_url(&self) -> &str {
        self.extract_api.as_deref().unwrap_or(&self.anon_api)
    }

    /// Scope string sent with the password grant.
    pub fn token_scope(&self) -> String {
        format!("host:{}", self.scope)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extract_api(mut self, url: impl Into<String>) -> Self {
        self.config.extract_api = Some(url.into());
        self
    }

    pub fn anon_api(mut self, url: impl Into<String>) -> Self {
        self.config.anon_api = url.into();
        self
    }

    pub fn auth_api(mut self, url: impl Into<String>) -> Self {
        self.config.auth_api = url.into();
        self
    }

    pub fn data_api(mut self, url: impl Into<String>) -> Self {
        self.config.data_api = url.into();
        self
    }

    /// Point every service at the same base URL. Handy against a single
    /// mock server.
    pub fn all_services(self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.extract_api(url.clone())
            .anon_api(url.clone())
            .auth_api(url.clone())
            .data_api(url)
    }

    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.config.api_user = user.into();
        self.config.api_pass = pass.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    pub fn anonymise(mut self, v: bool) -> Self {
        self.config.anonymise = v;
        self
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.config.dry_run = v;
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.poll.max_attempts = n;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll.interval_ms = ms;
        self
    }

    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.config.poll.initial_delay_ms = ms;
        self
    }

    pub fn text_completion(mut self, mode: TextCompletion) -> Self {
        self.config.poll.text_completion = mode;
        self
    }

    pub fn algorithms(mut self, steps: Vec<AlgorithmStep>) -> Self {
        self.config.algorithms = steps;
        self
    }

    pub fn upload_defaults(mut self, defaults: UploadDefaults) -> Self {
        self.config.upload_defaults = defaults;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Base URLs lose any trailing `/` so endpoint paths can be appended
    /// verbatim.
    pub fn build(mut self) -> Result<PipelineConfig, PipelineError> {
        let c = &mut self.config;

        if let Some(url) = c.extract_api.as_mut() {
            *url = normalise_base_url("extract_api", url)?;
        }
        c.anon_api = normalise_base_url("anon_api", &c.anon_api)?;
        c.auth_api = normalise_base_url("auth_api", &c.auth_api)?;
        c.data_api = normalise_base_url("data_api", &c.data_api)?;

        if c.poll.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.anonymise && c.algorithms.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "anonymization is enabled but the algorithm list is empty".into(),
            ));
        }
        if !c.dry_run && c.api_user.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "api_user is required unless dry_run is set".into(),
            ));
        }
        Ok(self.config)
    }
}

fn normalise_base_url(field: &str, url: &str) -> Result<String, PipelineError> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(PipelineError::InvalidConfig(format!(
            "{field} must be an http:// or https:// URL, got '{url}'"
        )));
    }
    Ok(trimmed.to_string())
}

// ── Poll policy ──────────────────────────────────────────────────────────

/// How a consolidated `text` status ends the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextCompletion {
    /// Keep polling; the next `empty` status finishes the job. (default)
    #[default]
    AwaitEmpty,
    /// Finish as soon as the `text` status arrives.
    Immediate,
}

/// Shape of the extraction poll loop: fixed pacing, fixed budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Maximum number of status polls. Default: 10.
    pub max_attempts: u32,
    /// Wait between submission and the first poll, in milliseconds. Default: 2000.
    pub initial_delay_ms: u64,
    /// Wait between two polls, in milliseconds. Default: 2000.
    pub interval_ms: u64,
    /// Termination rule for the consolidated-text path.
    pub text_completion: TextCompletion,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 2000,
            interval_ms: 2000,
            text_completion: TextCompletion::default(),
        }
    }
}

impl PollPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ── Upload defaults ──────────────────────────────────────────────────────

/// Fixed fields of the upload record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDefaults {
    pub country: String,
    pub court: String,
    pub year: i32,
    pub identifier: String,
    pub lang: String,
    pub appeal: String,
    pub user_key: String,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            country: "BE".to_string(),
            court: String::new(),
            year: 2000,
            identifier: String::new(),
            lang: "FR".to_string(),
            appeal: "nodata".to_string(),
            user_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_layout() {
        let c = PipelineConfig::default();
        assert_eq!(c.extract_url(), DEFAULT_ANON_API);
        assert_eq!(c.poll.max_attempts, 10);
        assert_eq!(c.poll.interval(), Duration::from_secs(2));
        assert_eq!(c.poll.text_completion, TextCompletion::AwaitEmpty);
        assert!(c.anonymise);
        assert_eq!(c.algorithms.len(), 2);
        assert_eq!(c.token_scope(), "host:localhost");
    }

    #[test]
    fn build_trims_trailing_slashes() {
        let c = PipelineConfig::builder()
            .anon_api("http://anon:5011/")
            .extract_api("http://extract:9000//")
            .credentials("u", "p")
            .build()
            .unwrap();
        assert_eq!(c.anon_api, "http://anon:5011");
        assert_eq!(c.extract_url(), "http://extract:9000");
        assert_eq!(c.data_api, "http://127.0.0.1:5010");
    }

    #[test]
    fn build_rejects_bad_url() {
        let err = PipelineConfig::builder()
            .data_api("ftp://nope")
            .credentials("u", "p")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("data_api"));
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let err = PipelineConfig::builder()
            .credentials("u", "p")
            .max_attempts(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn build_requires_user_unless_dry_run() {
        assert!(PipelineConfig::builder().build().is_err());
        assert!(PipelineConfig::builder().dry_run(true).build().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder()
            .credentials("alice", "hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("alice"));
        assert!(!dbg.contains("hunter2"));
    }
}
