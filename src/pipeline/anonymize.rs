//! Anonymization: one `/run` call carrying the algorithm pipeline and text.
//!
//! The service can answer HTTP 200 and still have failed; the failure then
//! shows up as an error marker in the returned diagnostic log. Any marker
//! invalidates the whole response, whatever the `text` field holds. There is
//! no retry.

use crate::client::ServiceClient;
use crate::error::PipelineError;
use crate::protocol::{AlgorithmStep, AnonymizeRequest, AnonymizeResponse};
use tracing::{error, info};

/// Client for the anonymization service.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    client: ServiceClient,
    base_url: String,
    algorithms: Vec<AlgorithmStep>,
}

impl Anonymizer {
    pub fn new(
        client: ServiceClient,
        base_url: impl Into<String>,
        algorithms: Vec<AlgorithmStep>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            algorithms,
        }
    }

    /// Run `text` through the configured passes and return the result.
    pub async fn anonymize(&self, text: String) -> Result<String, PipelineError> {
        let url = format!("{}/run", self.base_url);
        let request = AnonymizeRequest::new(&self.algorithms, &text);

        let response: AnonymizeResponse = self
            .client
            .post_json("anonymize", &url, &request, None)
            .await?;

        if let Some(detail) = response.error_marker() {
            error!("Anonymization log reports an error: {}", detail);
            return Err(PipelineError::AnonymizationFailed { detail });
        }

        info!(
            "Received anonymized version ({} → {} bytes)",
            text.len(),
            response.text.len()
        );
        Ok(response.text)
    }
}
