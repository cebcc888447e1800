//! # JSON Boundary Codec
//!
//! Encodes response envelopes and decodes request bodies strictly.
//!
//! ## Encoding
//!
//! Every success body is an [`Envelope`], a JSON object keyed by what it
//! carries (`{"user": {...}}`). [`write_json`] renders it tab-indented with a
//! trailing newline and sets `Content-Type: application/json`.
//!
//! ## Decoding
//!
//! [`decode`] accepts exactly one JSON value of at most `max_bytes` bytes and
//! classifies every failure into one [`DecodeError`] variant whose `Display`
//! is the client-facing message. Request types opt into unknown-field
//! rejection with `#[serde(deny_unknown_fields)]`. [`StrictJson`] is the
//! extractor form used by handlers.

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use http_body_util::LengthLimitError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::error::Category;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AppError;

/// Largest accepted request body, in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

// ── Encoding ────────────────────────────────────────────────────────────────

/// Top-level response object.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    /// An empty envelope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `payload` under `key`.
    pub fn with(mut self, key: &str, payload: impl Serialize) -> Result<Self, AppError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| AppError::Internal(format!("encoding \"{key}\": {e}")))?;
        self.0.insert(key.to_string(), value);
        Ok(self)
    }
}

/// Render `envelope` as the response body.
///
/// `headers` are merged into the response before `Content-Type` is set.
pub fn write_json(
    status: StatusCode,
    envelope: &Envelope,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let mut buf = Vec::with_capacity(256);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    envelope
        .serialize(&mut ser)
        .map_err(|e| AppError::Internal(format!("encoding response: {e}")))?;
    buf.push(b'\n');

    let mut response = Response::new(Body::from(buf));
    *response.status_mut() = status;
    response.headers_mut().extend(headers);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

// ── Decoding ────────────────────────────────────────────────────────────────

/// Classified request-body decoding failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed syntax at a byte offset.
    #[error("body contains badly-formed JSON (at character {offset})")]
    Syntax {
        /// Byte offset of the fault.
        offset: usize,
    },

    /// Input ended mid-value.
    #[error("body contains badly-formed JSON")]
    Truncated,

    /// No JSON value at all.
    #[error("body must not be empty")]
    Empty,

    /// A field holds a value of the wrong JSON type.
    #[error("body contains incorrect JSON type for field {field:?}")]
    FieldType {
        /// Dotted path of the offending field.
        field: String,
    },

    /// The top-level value has the wrong JSON type.
    #[error("body contains incorrect JSON type (at character {offset})")]
    ValueType {
        /// Byte offset of the fault.
        offset: usize,
    },

    /// An object key the target type does not declare.
    #[error("body contains unknown key {0:?}")]
    UnknownField(String),

    /// Body exceeds the size limit.
    #[error("body must not be larger than {limit} bytes")]
    TooLarge {
        /// The limit that was exceeded.
        limit: usize,
    },

    /// More than one JSON value in the body.
    #[error("body must only contain a single JSON value")]
    MultipleValues,

    /// Any other decoder complaint, passed through.
    #[error("{0}")]
    Other(String),

    /// The decoder itself failed. Not a client problem.
    #[error("decoder fault: {0}")]
    Local(String),
}

/// Decode exactly one JSON value from `body`.
pub fn decode<T: DeserializeOwned>(body: &[u8], max_bytes: usize) -> Result<T, DecodeError> {
    if body.len() > max_bytes {
        return Err(DecodeError::TooLarge { limit: max_bytes });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(body);
    let value: T = serde_path_to_error::deserialize(&mut de).map_err(|e| classify(body, e))?;
    de.end().map_err(|_| DecodeError::MultipleValues)?;
    Ok(value)
}

fn classify(body: &[u8], err: serde_path_to_error::Error<serde_json::Error>) -> DecodeError {
    let path = err.path().to_string();
    let inner = err.into_inner();
    let offset = byte_offset(body, inner.line(), inner.column());

    match inner.classify() {
        Category::Io => DecodeError::Local(inner.to_string()),
        Category::Eof => DecodeError::Truncated,
        Category::Syntax => DecodeError::Syntax { offset },
        Category::Data => {
            let message = inner.to_string();
            if let Some(name) = unknown_field_name(&message) {
                DecodeError::UnknownField(name)
            } else if is_type_mismatch(&message) {
                if path == "." {
                    DecodeError::ValueType { offset }
                } else {
                    DecodeError::FieldType { field: path }
                }
            } else {
                DecodeError::Other(message)
            }
        }
    }
}

/// Convert serde_json's 1-based line and column into a byte offset.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    let line_start: usize = body
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    line_start + column
}

fn unknown_field_name(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown field `")?;
    rest.split('`').next().map(str::to_string)
}

fn is_type_mismatch(message: &str) -> bool {
    ["invalid type", "invalid value", "invalid length"]
        .iter()
        .any(|p| message.starts_with(p))
}

// ── Extractor ───────────────────────────────────────────────────────────────

/// Strict JSON body extractor. Rejects with [`AppError::BadRequest`] carrying
/// the classified message.
#[derive(Debug, Clone)]
pub struct StrictJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for StrictJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req.into_body(), MAX_BODY_BYTES).await?;
        Ok(Self(decode(&bytes, MAX_BODY_BYTES)?))
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        if exceeded_limit(&e) {
            DecodeError::TooLarge { limit }
        } else {
            DecodeError::Other(e.to_string())
        }
    })
}

fn exceeded_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Probe {
        #[serde(default)]
        a: Option<u32>,
        #[serde(default)]
        name: Option<String>,
    }

    fn decode_probe(body: &str) -> Result<Probe, DecodeError> {
        decode(body.as_bytes(), MAX_BODY_BYTES)
    }

    // ── decode ──────────────────────────────────────────────────

    #[test]
    fn accepts_single_object() {
        let probe = decode_probe(r#"{"a": 7, "name": "x"}"#).unwrap();
        assert_eq!(probe.a, Some(7));
        assert_eq!(probe.name.as_deref(), Some("x"));
    }

    #[test]
    fn malformed_syntax_reports_offset() {
        let err = decode_probe(r#"{"a": 1,}"#).unwrap_err();
        match &err {
            DecodeError::Syntax { offset } => assert!(*offset > 0),
            other => panic!("expected Syntax, got: {other:?}"),
        }
        assert!(err
            .to_string()
            .starts_with("body contains badly-formed JSON (at character "));
    }

    #[test]
    fn offset_accounts_for_earlier_lines() {
        let err = decode_probe("{\n\"a\": 1,\n}").unwrap_err();
        assert!(
            matches!(err, DecodeError::Syntax { offset } if offset >= 10),
            "{err:?}"
        );
    }

    #[test]
    fn truncated_body() {
        let err = decode_probe(r#"{"name": "ali"#).unwrap_err();
        assert_eq!(err, DecodeError::Truncated);
        assert_eq!(err.to_string(), "body contains badly-formed JSON");
    }

    #[test]
    fn empty_body() {
        assert_eq!(decode_probe("").unwrap_err(), DecodeError::Empty);
        assert_eq!(decode_probe(" \n\t").unwrap_err(), DecodeError::Empty);
        assert_eq!(DecodeError::Empty.to_string(), "body must not be empty");
    }

    #[test]
    fn field_type_mismatch_names_the_field() {
        let err = decode_probe(r#"{"a": "seven"}"#).unwrap_err();
        assert_eq!(err, DecodeError::FieldType { field: "a".into() });
        assert_eq!(
            err.to_string(),
            r#"body contains incorrect JSON type for field "a""#
        );
    }

    #[test]
    fn top_level_type_mismatch_reports_offset() {
        let err = decode_probe(r#""just a string""#).unwrap_err();
        assert!(matches!(err, DecodeError::ValueType { .. }), "{err:?}");
    }

    #[test]
    fn unknown_field_is_named() {
        let err = decode_probe(r#"{"foo": 1}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownField("foo".into()));
        assert_eq!(err.to_string(), r#"body contains unknown key "foo""#);
    }

    #[test]
    fn oversize_names_the_limit() {
        let body = vec![b' '; MAX_BODY_BYTES + 1];
        let err = decode::<Probe>(&body, MAX_BODY_BYTES).unwrap_err();
        assert_eq!(err, DecodeError::TooLarge { limit: MAX_BODY_BYTES });
        assert_eq!(err.to_string(), "body must not be larger than 1048576 bytes");
    }

    #[test]
    fn second_value_is_rejected() {
        let err = decode_probe(r#"{"a":1}{"b":2}"#).unwrap_err();
        assert_eq!(err, DecodeError::MultipleValues);
        assert_eq!(err.to_string(), "body must only contain a single JSON value");
    }

    #[test]
    fn trailing_whitespace_is_fine() {
        assert!(decode_probe("{\"a\": 1}\n\n").is_ok());
    }

    #[test]
    fn unclassified_failures_pass_through() {
        #[derive(Debug, Deserialize)]
        struct Required {
            #[allow(dead_code)]
            id: u32,
        }
        let err = decode::<Required>(b"{}", MAX_BODY_BYTES).unwrap_err();
        match err {
            DecodeError::Other(msg) => assert!(msg.contains("missing field")),
            other => panic!("expected Other, got: {other:?}"),
        }
    }

    // ── write_json ──────────────────────────────────────────────

    #[tokio::test]
    async fn write_json_is_tab_indented_with_trailing_newline() {
        let envelope = Envelope::new().with("user", serde_json::json!({"id": 1})).unwrap();
        let mut extra = HeaderMap::new();
        extra.insert("location", HeaderValue::from_static("/v1/users/1"));

        let response = write_json(StatusCode::CREATED, &envelope, extra).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()["location"], "/v1/users/1");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"{\n\t\"user\": {\n\t\t\"id\": 1\n\t}\n}\n");
    }

    // ── StrictJson ──────────────────────────────────────────────

    fn echo_app() -> Router {
        Router::new().route(
            "/echo",
            post(|StrictJson(probe): StrictJson<Probe>| async move {
                format!("{:?}", probe.a)
            }),
        )
    }

    async fn post_body(body: Vec<u8>) -> (StatusCode, serde_json::Value) {
        let response = echo_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn extractor_rejects_oversize_body() {
        let mut body = br#"{"name":""#.to_vec();
        body.extend(std::iter::repeat(b'x').take(MAX_BODY_BYTES));
        body.extend(br#""}"#);
        let (status, json) = post_body(body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "body must not be larger than 1048576 bytes");
    }

    #[tokio::test]
    async fn extractor_rejects_unknown_key() {
        let (status, json) = post_body(br#"{"foo": true}"#.to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], r#"body contains unknown key "foo""#);
    }

    #[tokio::test]
    async fn extractor_accepts_valid_body() {
        let response = echo_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(r#"{"a": 3}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Some(3)");
    }
}
