//! Wire types for the four collaborating services.
//!
//! Request bodies borrow from the caller where they can; response bodies are
//! decoded leniently (missing optional fields default) and then checked by
//! the stage that owns them.
//!
//! The extraction status is the only payload with real structure: a
//! `{status, value}` envelope whose `value` shape depends on the tag. It is
//! decoded in two steps, first into [`RawStatus`] and then into the
//! [`ExtractionStatus`] sum type, so unknown tags and malformed values both
//! surface as [`PipelineError::InvalidResponse`] instead of a serde message
//! about untagged variants.

use crate::config::UploadDefaults;
use crate::error::PipelineError;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag sent as `_v` in every JSON request body.
pub const WIRE_VERSION: u32 = 1;

/// Current Unix time in seconds, as sent in `_timestamp`.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Response to `POST /extract/`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "ref")]
    pub job_ref: String,
}

/// Undecoded status envelope from `GET /extract/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    pub status: String,
    #[serde(default)]
    pub value: Value,
}

/// Page count and OCR flag, reported once per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractionMeta {
    #[serde(rename = "pages", deserialize_with = "de_index")]
    pub total_pages: usize,
    #[serde(rename = "doOcr", default)]
    pub ocr_in_progress: bool,
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PageFragment {
    #[serde(deserialize_with = "de_index")]
    pub page: usize,
    #[serde(default)]
    pub text: String,
}

/// One poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// The job failed; carries the service diagnostic.
    Error(String),
    /// Document metadata became available.
    Meta(ExtractionMeta),
    /// One page of text.
    Page(PageFragment),
    /// The whole document in one piece.
    Text(String),
    /// Nothing new since the last poll.
    Empty,
}

impl ExtractionStatus {
    /// The wire tag of this status.
    pub fn tag(&self) -> &'static str {
        match self {
            ExtractionStatus::Error(_) => "error",
            ExtractionStatus::Meta(_) => "meta",
            ExtractionStatus::Page(_) => "page",
            ExtractionStatus::Text(_) => "text",
            ExtractionStatus::Empty => "empty",
        }
    }

    /// Interpret a status envelope.
    pub fn from_raw(raw: RawStatus) -> Result<Self, PipelineError> {
        let invalid = |detail: String| PipelineError::InvalidResponse {
            service: "extract",
            detail,
        };

        match raw.status.as_str() {
            "error" => Ok(ExtractionStatus::Error(render_value(&raw.value))),
            "meta" => serde_json::from_value(raw.value)
                .map(ExtractionStatus::Meta)
                .map_err(|e| invalid(format!("malformed meta value: {e}"))),
            "page" => serde_json::from_value(raw.value)
                .map(ExtractionStatus::Page)
                .map_err(|e| invalid(format!("malformed page value: {e}"))),
            "text" => match raw.value {
                Value::String(s) => Ok(ExtractionStatus::Text(s)),
                other => Err(invalid(format!("text status carries non-string value {other}"))),
            },
            "empty" => Ok(ExtractionStatus::Empty),
            other => Err(invalid(format!("unknown status '{other}'"))),
        }
    }
}

/// Accept `3`, `3.0` or `"3"` for page numbers and counts.
fn de_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    let n = match &v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    n.map(|n| n as usize)
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {v}")))
}

/// Human-readable rendering of a diagnostic value.
fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "no detail given".to_string(),
        other => other.to_string(),
    }
}

// ── Anonymization ────────────────────────────────────────────────────────

/// One anonymization pass: an algorithm id and its JSON-encoded parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmStep {
    pub id: String,
    pub params: String,
}

impl AlgorithmStep {
    /// Build a step from structured parameters.
    pub fn new(id: impl Into<String>, params: &Value) -> Self {
        Self {
            id: id.into(),
            params: params.to_string(),
        }
    }

    /// Pattern bracketing followed by masking.
    pub fn default_pipeline() -> Vec<AlgorithmStep> {
        vec![
            AlgorithmStep::new("anon_trazor", &serde_json::json!({ "method": "brackets" })),
            AlgorithmStep::new("anon_mask", &serde_json::json!({})),
        ]
    }
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Serialize)]
pub struct AnonymizeRequest<'a> {
    #[serde(rename = "_v")]
    pub version: u32,
    #[serde(rename = "_timestamp")]
    pub timestamp: i64,
    pub algo_list: &'a [AlgorithmStep],
    pub format: &'static str,
    pub encoding: &'static str,
    pub text: &'a str,
    pub anon_log: bool,
    pub error: bool,
}

impl<'a> AnonymizeRequest<'a> {
    pub fn new(algo_list: &'a [AlgorithmStep], text: &'a str) -> Self {
        Self {
            version: WIRE_VERSION,
            timestamp: unix_timestamp(),
            algo_list,
            format: "text",
            encoding: "utf8",
            text,
            anon_log: false,
            error: false,
        }
    }
}

/// Response to `POST /run`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnonymizeResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub log: Value,
}

impl AnonymizeResponse {
    /// The error carried in the diagnostic log, if any.
    ///
    /// The log is free-form: an object with an `error` key, an array with
    /// an `"error"` entry (or an object entry with an `error` key), or a
    /// plain string mentioning `error` all count.
    pub fn error_marker(&self) -> Option<String> {
        match &self.log {
            Value::Object(map) => map.get("error").map(|_| self.log.to_string()),
            Value::Array(items) => items
                .iter()
                .any(|item| match item {
                    Value::String(s) => s == "error",
                    Value::Object(map) => map.contains_key("error"),
                    _ => false,
                })
                .then(|| self.log.to_string()),
            Value::String(s) if s.contains("error") => Some(s.clone()),
            _ => None,
        }
    }
}

// ── Authentication ───────────────────────────────────────────────────────

/// Form body of `POST /token` (OAuth2 password grant, public client).
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'static str,
    pub username: &'a str,
    pub password: &'a str,
    pub scope: &'a str,
    pub client_id: &'static str,
    pub client_secret: &'static str,
}

impl<'a> TokenRequest<'a> {
    pub fn password_grant(username: &'a str, password: &'a str, scope: &'a str) -> Self {
        Self {
            grant_type: "password",
            username,
            password,
            scope,
            client_id: "",
            client_secret: "",
        }
    }
}

/// Response to `POST /token`. Both fields are optional on the wire; a
/// missing access token is what marks a failed exchange.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

// ── Data storage ─────────────────────────────────────────────────────────

/// Body of `POST /create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "_v")]
    pub version: u32,
    #[serde(rename = "_timestamp")]
    pub timestamp: i64,
    pub country: String,
    pub court: String,
    pub year: i32,
    pub identifier: String,
    pub text: String,
    pub lang: String,
    pub labels: Vec<String>,
    pub appeal: String,
    pub user_key: String,
    pub doc_links: Vec<String>,
}

impl UploadRecord {
    /// A record carrying `text` and the configured defaults for everything else.
    pub fn new(text: String, defaults: &UploadDefaults) -> Self {
        Self {
            version: WIRE_VERSION,
            timestamp: unix_timestamp(),
            country: defaults.country.clone(),
            court: defaults.court.clone(),
            year: defaults.year,
            identifier: defaults.identifier.clone(),
            text,
            lang: defaults.lang.clone(),
            labels: Vec::new(),
            appeal: defaults.appeal.clone(),
            user_key: defaults.user_key.clone(),
            doc_links: Vec::new(),
        }
    }
}

/// Response to `POST /create`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(v: Value) -> Result<ExtractionStatus, PipelineError> {
        let raw: RawStatus = serde_json::from_value(v).unwrap();
        ExtractionStatus::from_raw(raw)
    }

    #[test]
    fn decodes_every_status_kind() {
        assert_eq!(
            decode(json!({"status": "meta", "value": {"pages": 2, "doOcr": true}})).unwrap(),
            ExtractionStatus::Meta(ExtractionMeta {
                total_pages: 2,
                ocr_in_progress: true
            })
        );
        assert_eq!(
            decode(json!({"status": "page", "value": {"page": "1", "text": "World"}})).unwrap(),
            ExtractionStatus::Page(PageFragment {
                page: 1,
                text: "World".into()
            })
        );
        assert_eq!(
            decode(json!({"status": "text", "value": "Full doc"})).unwrap(),
            ExtractionStatus::Text("Full doc".into())
        );
        assert_eq!(
            decode(json!({"status": "empty"})).unwrap(),
            ExtractionStatus::Empty
        );
        assert_eq!(
            decode(json!({"status": "error", "value": "corrupt"})).unwrap(),
            ExtractionStatus::Error("corrupt".into())
        );
    }

    #[test]
    fn meta_without_ocr_flag_defaults_to_false() {
        let status = decode(json!({"status": "meta", "value": {"pages": 0}})).unwrap();
        assert_eq!(status, ExtractionStatus::Meta(ExtractionMeta::default()));
    }

    #[test]
    fn error_value_rendered_as_json_when_structured() {
        let status = decode(json!({"status": "error", "value": {"code": 3}})).unwrap();
        assert_eq!(status, ExtractionStatus::Error(r#"{"code":3}"#.into()));
    }

    #[test]
    fn unknown_status_is_invalid_response() {
        let err = decode(json!({"status": "done", "value": null})).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidResponse { service: "extract", .. }));
    }

    #[test]
    fn negative_page_is_invalid_response() {
        let err = decode(json!({"status": "page", "value": {"page": -1, "text": ""}})).unwrap_err();
        assert!(err.to_string().contains("malformed page value"));
    }

    #[test]
    fn default_pipeline_serialises_params_as_strings() {
        let steps = AlgorithmStep::default_pipeline();
        let body = serde_json::to_value(AnonymizeRequest::new(&steps, "abc")).unwrap();
        assert_eq!(body["_v"], 1);
        assert_eq!(body["algo_list"][0]["id"], "anon_trazor");
        assert_eq!(body["algo_list"][0]["params"], r#"{"method":"brackets"}"#);
        assert_eq!(body["algo_list"][1]["params"], "{}");
        assert_eq!(body["format"], "text");
        assert_eq!(body["encoding"], "utf8");
        assert_eq!(body["anon_log"], false);
        assert_eq!(body["error"], false);
    }

    #[test]
    fn error_marker_shapes() {
        let resp = |log: Value| AnonymizeResponse {
            text: "[REDACTED]".into(),
            log,
        };
        assert!(resp(json!({"error": "bad config"})).error_marker().is_some());
        assert!(resp(json!(["info", "error"])).error_marker().is_some());
        assert!(resp(json!([{"error": "x"}])).error_marker().is_some());
        assert!(resp(json!("an error occurred")).error_marker().is_some());
        assert!(resp(json!({"steps": 2})).error_marker().is_none());
        assert!(resp(json!([])).error_marker().is_none());
        assert!(resp(Value::Null).error_marker().is_none());
    }

    #[test]
    fn token_request_is_public_password_grant() {
        let form = TokenRequest::password_grant("u", "p", "host:localhost");
        let v = serde_json::to_value(&form).unwrap();
        assert_eq!(v["grant_type"], "password");
        assert_eq!(v["client_id"], "");
        assert_eq!(v["client_secret"], "");
        assert_eq!(v["scope"], "host:localhost");
    }

    #[test]
    fn upload_record_uses_defaults() {
        let rec = UploadRecord::new("body".into(), &UploadDefaults::default());
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["country"], "BE");
        assert_eq!(v["year"], 2000);
        assert_eq!(v["lang"], "FR");
        assert_eq!(v["appeal"], "nodata");
        assert_eq!(v["labels"], json!([]));
        assert_eq!(v["doc_links"], json!([]));
        assert_eq!(v["text"], "body");
        assert!(v["_timestamp"].as_i64().unwrap() > 0);
    }
}
