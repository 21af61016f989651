//! Thin HTTP adapter shared by every stage.
//!
//! Each call is one request and one JSON response. The adapter owns the
//! three failure shapes every service shares (transport fault, non-success
//! status, undecodable body) so the stages only deal with what the decoded
//! payload says.

use crate::error::PipelineError;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Longest body excerpt kept in error messages.
const BODY_EXCERPT: usize = 512;

/// Shared `reqwest` client plus the request helpers the stages need.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
}

impl ServiceClient {
    /// Build a client. `timeout_secs` applies to each request individually.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, PipelineError> {
        let mut builder = Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| PipelineError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// `POST` a multipart form.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: &str,
        form: Form,
    ) -> Result<T, PipelineError> {
        self.send(service, url, self.http.post(url).multipart(form))
            .await
    }

    /// `GET` with query parameters.
    pub async fn get_json<T, Q>(
        &self,
        service: &'static str,
        url: &str,
        query: &Q,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(service, url, self.http.get(url).query(query))
            .await
    }

    /// `POST` a JSON body, optionally with a ready-made `Authorization` value.
    pub async fn post_json<T, B>(
        &self,
        service: &'static str,
        url: &str,
        body: &B,
        authorization: Option<&str>,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(value) = authorization {
            request = request.header(AUTHORIZATION, value);
        }
        self.send(service, url, request).await
    }

    /// `POST` a form-encoded body.
    pub async fn post_form<T, B>(
        &self,
        service: &'static str,
        url: &str,
        form: &B,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send(service, url, self.http.post(url).form(form))
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, PipelineError> {
        debug!("{} request: {}", service, url);

        let response = request
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| PipelineError::Transport {
                service,
                url: url.to_string(),
                reason: describe_transport_error(&e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PipelineError::Transport {
            service,
            url: url.to_string(),
            reason: format!("failed to read body: {e}"),
        })?;

        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                service,
                url: url.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| PipelineError::InvalidResponse {
            service,
            detail: format!("{e}; body: {}", excerpt(&body)),
        })
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
