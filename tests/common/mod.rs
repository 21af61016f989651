//! Mock service helpers shared by the integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Once;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

/// Initializes tracing for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// `POST /extract/` answers with `job_ref`.
pub async fn mount_submit(server: &MockServer, job_ref: &str) {
    Mock::given(method("POST"))
        .and(path("/extract/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ref": job_ref })))
        .mount(server)
        .await;
}

/// `GET /extract/status?ref=<job_ref>` answers with `statuses`, one per
/// poll, in order.
pub async fn mount_statuses(server: &MockServer, job_ref: &str, statuses: Vec<Value>) {
    for status in statuses {
        Mock::given(method("GET"))
            .and(path("/extract/status"))
            .and(query_param("ref", job_ref))
            .respond_with(ResponseTemplate::new(200).set_body_json(status))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

pub fn meta(pages: usize, ocr: bool) -> Value {
    json!({ "status": "meta", "value": { "pages": pages, "doOcr": ocr } })
}

pub fn page(n: usize, text: &str) -> Value {
    json!({ "status": "page", "value": { "page": n, "text": text } })
}

pub fn text(body: &str) -> Value {
    json!({ "status": "text", "value": body })
}

pub fn empty() -> Value {
    json!({ "status": "empty", "value": null })
}

pub fn error(detail: &str) -> Value {
    json!({ "status": "error", "value": detail })
}

/// Number of requests the server saw on `endpoint`.
pub async fn hits(server: &MockServer, endpoint: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == endpoint)
        .count()
}
