//! Per-stage tests against mock HTTP services.
//!
//! Each test stands up a `wiremock` server playing one remote service and
//! drives a single stage client against it.

mod common;

use common::*;
use docpipe::client::ServiceClient;
use docpipe::pipeline::anonymize::Anonymizer;
use docpipe::pipeline::upload::{Authenticator, Uploader};
use docpipe::protocol::UploadRecord;
use docpipe::{
    AlgorithmStep, AuthToken, Extractor, HttpExtractionService, NoDelay, PipelineError,
    PollPolicy, SourceDocument, TextCompletion, UploadDefaults,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> ServiceClient {
    ServiceClient::new(Some(5)).expect("client")
}

fn extractor(server: &MockServer, max_attempts: u32) -> Extractor {
    let service = Arc::new(HttpExtractionService::new(client(), server.uri()));
    let policy = PollPolicy {
        max_attempts,
        ..PollPolicy::default()
    };
    Extractor::new(service, policy).with_delay(Arc::new(NoDelay))
}

fn sample() -> SourceDocument {
    SourceDocument::from_bytes("test_fr_7.pdf", b"%PDF-1.4 sample".to_vec())
}

// ── Extraction ───────────────────────────────────────────────────────────

#[tokio::test]
async fn extraction_assembles_pages_over_http() {
    setup_tracing();
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(
        &server,
        "abc",
        vec![meta(2, false), page(0, "Hello "), page(1, "World"), empty()],
    )
    .await;

    let result = extractor(&server, 10).extract(sample()).await.unwrap();

    assert_eq!(result.job_ref, "abc");
    assert_eq!(result.text, "Hello World");
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.attempts, 4);
    assert_eq!(hits(&server, "/extract/status").await, 4);
}

#[tokio::test]
async fn submit_sends_file_as_raw_file_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract/"))
        .and(body_string_contains("name=\"rawFile\""))
        .and(body_string_contains("filename=\"test_fr_7.pdf\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ref": "r-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let job = extractor(&server, 10).submit(sample()).await.unwrap();
    assert_eq!(job.as_str(), "r-1");
}

#[tokio::test]
async fn extraction_consolidated_text_wins() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(
        &server,
        "abc",
        vec![
            meta(2, true),
            page(0, "draft "),
            text("Full document text"),
            empty(),
        ],
    )
    .await;

    let result = extractor(&server, 10).extract(sample()).await.unwrap();
    assert_eq!(result.text, "Full document text");
    assert!(result.consolidated);
    assert!(result.ocr);
}

#[tokio::test]
async fn extraction_immediate_mode_stops_on_text() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(&server, "abc", vec![meta(1, false), text("Final")]).await;

    let service = Arc::new(HttpExtractionService::new(client(), server.uri()));
    let policy = PollPolicy {
        text_completion: TextCompletion::Immediate,
        ..PollPolicy::default()
    };
    let result = Extractor::new(service, policy)
        .with_delay(Arc::new(NoDelay))
        .extract(sample())
        .await
        .unwrap();

    assert_eq!(result.text, "Final");
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn extraction_error_status_aborts_polling() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(
        &server,
        "abc",
        vec![meta(3, false), error("corrupt file"), page(0, "never")],
    )
    .await;

    let err = extractor(&server, 10).extract(sample()).await.unwrap_err();

    match err {
        PipelineError::ExtractionFailed { job_ref, detail } => {
            assert_eq!(job_ref, "abc");
            assert_eq!(detail, "corrupt file");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
    assert_eq!(hits(&server, "/extract/status").await, 2);
}

#[tokio::test]
async fn extraction_gives_up_after_budget() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    Mock::given(method("GET"))
        .and(path("/extract/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(meta(5, false)))
        .mount(&server)
        .await;

    let err = extractor(&server, 3).extract(sample()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::PollBudgetExceeded { max_attempts: 3, .. }
    ));
    assert_eq!(hits(&server, "/extract/status").await, 3);
}

#[tokio::test]
async fn oversized_page_numbers_end_in_budget_error() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(
        &server,
        "abc",
        vec![
            json!({ "status": "meta", "value": { "pages": 1e10 } }),
            json!({ "status": "page", "value": { "page": "18446744073709551615", "text": "x" } }),
            empty(),
        ],
    )
    .await;

    let err = extractor(&server, 3).extract(sample()).await.unwrap_err();

    match err {
        PipelineError::PollBudgetExceeded { received, total, .. } => {
            assert_eq!(received, 1);
            assert_eq!(total, 10_000_000_000);
        }
        other => panic!("expected PollBudgetExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_status_is_invalid_response() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    mount_statuses(
        &server,
        "abc",
        vec![json!({ "status": "paused", "value": null })],
    )
    .await;

    let err = extractor(&server, 10).extract(sample()).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidResponse { service: "extract", .. }
    ));
}

#[tokio::test]
async fn non_json_status_is_invalid_response() {
    let server = MockServer::start().await;
    mount_submit(&server, "abc").await;
    Mock::given(method("GET"))
        .and(path("/extract/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = extractor(&server, 10).extract(sample()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidResponse { .. }));
}

#[tokio::test]
async fn submit_server_error_is_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/extract/"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = extractor(&server, 10).submit(sample()).await.unwrap_err();
    match err {
        PipelineError::HttpStatus { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    // Bind then release a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let service = Arc::new(HttpExtractionService::new(client(), uri));
    let err = Extractor::new(service, PollPolicy::default())
        .with_delay(Arc::new(NoDelay))
        .submit(sample())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Transport { service: "extract", .. }));
}

// ── Anonymization ────────────────────────────────────────────────────────

#[tokio::test]
async fn anonymize_posts_algorithm_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .and(body_partial_json(json!({
            "format": "text",
            "encoding": "utf8",
            "text": "Jean Dupont lives here",
            "anon_log": false,
            "error": false,
            "algo_list": [
                { "id": "anon_trazor", "params": "{\"method\":\"brackets\"}" },
                { "id": "anon_mask", "params": "{}" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "[PERSON] lives here",
            "log": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let anonymizer = Anonymizer::new(client(), server.uri(), AlgorithmStep::default_pipeline());
    let text = anonymizer
        .anonymize("Jean Dupont lives here".to_string())
        .await
        .unwrap();

    assert_eq!(text, "[PERSON] lives here");
}

#[tokio::test]
async fn anonymize_error_log_fails_despite_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "text": "[REDACTED]",
            "log": { "error": "bad config" }
        })))
        .mount(&server)
        .await;

    let anonymizer = Anonymizer::new(client(), server.uri(), AlgorithmStep::default_pipeline());
    let err = anonymizer.anonymize("secret".to_string()).await.unwrap_err();

    match err {
        PipelineError::AnonymizationFailed { detail } => assert!(detail.contains("bad config")),
        other => panic!("expected AnonymizationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn anonymize_server_error_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let anonymizer = Anonymizer::new(client(), server.uri(), AlgorithmStep::default_pipeline());
    let err = anonymizer.anonymize("x".to_string()).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::HttpStatus { service: "anonymize", status: 500, .. }
    ));
}

// ── Authentication ───────────────────────────────────────────────────────

#[tokio::test]
async fn authenticate_sends_password_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=tester"))
        .and(body_string_contains("password=secret"))
        .and(body_string_contains("scope=host%3Alocalhost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "tok-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = Authenticator::new(client(), server.uri())
        .authenticate("tester", "secret", "host:localhost")
        .await
        .unwrap();

    assert_eq!(token.authorization(), "Bearer tok-1");
}

#[tokio::test]
async fn authenticate_without_access_token_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "detail": "invalid credentials" })),
        )
        .mount(&server)
        .await;

    let err = Authenticator::new(client(), server.uri())
        .authenticate("tester", "wrong", "host:localhost")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::AuthFailed { ref user, .. } if user == "tester"));
}

#[tokio::test]
async fn authenticate_rejected_status_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let err = Authenticator::new(client(), server.uri())
        .authenticate("tester", "wrong", "host:localhost")
        .await
        .unwrap_err();

    match err {
        PipelineError::AuthFailed { detail, .. } => assert!(detail.contains("401")),
        other => panic!("expected AuthFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn authenticate_defaults_token_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "t" })))
        .mount(&server)
        .await;

    let token = Authenticator::new(client(), server.uri())
        .authenticate("tester", "secret", "host:localhost")
        .await
        .unwrap();

    assert_eq!(token.token_type(), "Bearer");
}

// ── Upload ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_returns_hash_and_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({
            "_v": 1,
            "country": "BE",
            "year": 2000,
            "lang": "FR",
            "appeal": "nodata",
            "text": "[PERSON] lives here"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "result": "ok", "hash": "h123" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = UploadRecord::new("[PERSON] lives here".into(), &UploadDefaults::default());
    let receipt = Uploader::new(client(), server.uri())
        .upload(AuthToken::new("Bearer", "tok-1"), &record)
        .await
        .unwrap();

    assert_eq!(receipt.hash, "h123");
    assert_eq!(receipt.url, format!("{}/hash/h123", server.uri()));
}

#[tokio::test]
async fn upload_rejected_result_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "nok" })))
        .mount(&server)
        .await;

    let record = UploadRecord::new("text".into(), &UploadDefaults::default());
    let err = Uploader::new(client(), server.uri())
        .upload(AuthToken::new("Bearer", "t"), &record)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UploadFailed { ref result } if result == "nok"));
}

#[tokio::test]
async fn upload_ok_without_hash_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "ok" })))
        .mount(&server)
        .await;

    let record = UploadRecord::new("text".into(), &UploadDefaults::default());
    let err = Uploader::new(client(), server.uri())
        .upload(AuthToken::new("Bearer", "t"), &record)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidResponse { service: "data", .. }));
}
