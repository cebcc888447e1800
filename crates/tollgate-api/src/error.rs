//! # API Error Types
//!
//! [`AppError`] is the closed set of outcomes a request can fail with. Each
//! variant maps to one status code and the `{"error": ...}` envelope.
//!
//! Server faults ([`AppError::Internal`] and [`AppError::Invariant`]) never
//! reach the client in detail. The response carries a generic message and
//! stashes the detail in a response extension; [`error_boundary`] picks it up
//! and writes it to the structured log together with the request method and
//! URL.

use axum::extract::{Request, State};
use axum::http::header::{ALLOW, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tollgate_core::logger::props;
use tollgate_core::{FieldErrors, PasswordError, StoreError, TokenError};

use crate::json::{write_json, DecodeError, Envelope};
use crate::state::AppState;

/// Message returned to clients for every server fault.
pub const SERVER_FAULT_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body could not be decoded (400).
    #[error("{0}")]
    BadRequest(String),

    /// One or more fields failed validation (422).
    #[error("failed validation: {0:?}")]
    Validation(FieldErrors),

    /// Email/password pair did not match (401).
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    /// Bearer credential malformed, unknown or expired (401).
    #[error("invalid or missing authentication token")]
    InvalidToken,

    /// Anonymous caller on a protected route (401).
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    /// Authenticated but not yet activated (403).
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    /// Authenticated but lacking the required capability (403).
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    /// No such route or record (404).
    #[error("the requested resource could not be found")]
    NotFound,

    /// Route exists but not for this method (405).
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),

    /// Optimistic-concurrency version mismatch (409).
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    /// Client exceeded its request budget (429).
    #[error("rate limit exceeded")]
    RateLimited,

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// A programming invariant was violated (500). Logged, never returned.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Fault detail carried from [`AppError::into_response`] to [`error_boundary`].
#[derive(Debug, Clone)]
pub struct FaultDetail(pub String);

impl AppError {
    /// Single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCredentials | Self::InvalidToken | Self::AuthenticationRequired => {
                StatusCode::UNAUTHORIZED
            }
            Self::InactiveAccount | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) | Self::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this is a server fault rather than a client error.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Internal(_) | Self::Invariant(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let envelope = match &self {
            Self::Validation(errors) => Envelope::new().with("error", errors),
            Self::Internal(_) | Self::Invariant(_) => {
                Envelope::new().with("error", SERVER_FAULT_MESSAGE)
            }
            other => Envelope::new().with("error", other.to_string()),
        };

        let mut headers = HeaderMap::new();
        if matches!(self, Self::InvalidToken) {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        let mut response = match envelope.and_then(|e| write_json(status, &e, headers)) {
            Ok(response) => response,
            Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_FAULT_MESSAGE).into_response(),
        };

        if self.is_fault() {
            response.extensions_mut().insert(FaultDetail(self.to_string()));
        }
        response
    }
}

// ── Conversions ─────────────────────────────────────────────────────────────

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::EditConflict => Self::EditConflict,
            StoreError::DuplicateEmail => {
                Self::invalid_field("email", "a user with this email address already exists")
            }
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Store(e) => e.into(),
            TokenError::Entropy(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Local(_) => Self::Invariant(err.to_string()),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

// ── Error Boundary Middleware ───────────────────────────────────────────────

/// Log server faults and give bare router rejections the JSON envelope.
///
/// Runs inside the panic guard and outside authentication, so faults raised
/// by the identity resolver are logged too.
pub async fn error_boundary(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    if let Some(FaultDetail(detail)) = response.extensions_mut().remove::<FaultDetail>() {
        state.logger.error(
            detail,
            props([
                ("request_method", method.to_string()),
                ("request_url", uri.to_string()),
            ]),
        );
    }

    // The method router answers 405 with an empty body.
    if response.status() == StatusCode::METHOD_NOT_ALLOWED
        && !response.headers().contains_key(CONTENT_TYPE)
    {
        let allow = response.headers().get(ALLOW).cloned();
        response = AppError::MethodNotAllowed(method.to_string()).into_response();
        if let Some(allow) = allow {
            response.headers_mut().insert(ALLOW, allow);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, HeaderMap, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Validation(FieldErrors::new()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AppError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (AppError::InactiveAccount, StatusCode::FORBIDDEN),
            (AppError::NotPermitted, StatusCode::FORBIDDEN),
            (AppError::NotFound, StatusCode::NOT_FOUND),
            (AppError::MethodNotAllowed("GET".into()), StatusCode::METHOD_NOT_ALLOWED),
            (AppError::EditConflict, StatusCode::CONFLICT),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Invariant("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err:?}");
        }
    }

    #[tokio::test]
    async fn client_error_body_is_the_message() {
        let (status, headers, body) = response_parts(AppError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "the requested resource could not be found");
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn validation_body_is_field_keyed() {
        let err = AppError::invalid_field("email", "must be provided");
        let (status, _, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["email"], "must be provided");
    }

    #[tokio::test]
    async fn invalid_token_challenges_for_bearer() {
        let (status, headers, _) = response_parts(AppError::InvalidToken).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[WWW_AUTHENTICATE], "Bearer");

        let (_, headers, _) = response_parts(AppError::AuthenticationRequired).await;
        assert!(headers.get(WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn faults_hide_details_and_carry_them_in_extensions() {
        for err in [
            AppError::Internal("db connection failed".into()),
            AppError::Invariant("identity slot empty".into()),
        ] {
            let response = err.into_response();
            let detail = response.extensions().get::<FaultDetail>().cloned().unwrap();
            assert!(!detail.0.is_empty());
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["error"], SERVER_FAULT_MESSAGE);
        }
    }

    #[test]
    fn client_errors_carry_no_fault_detail() {
        let response = AppError::NotPermitted.into_response();
        assert!(response.extensions().get::<FaultDetail>().is_none());
    }

    #[test]
    fn store_errors_convert() {
        assert!(matches!(AppError::from(StoreError::NotFound), AppError::NotFound));
        assert!(matches!(AppError::from(StoreError::EditConflict), AppError::EditConflict));
        assert!(matches!(AppError::from(StoreError::Backend("x".into())), AppError::Internal(_)));
        match AppError::from(StoreError::DuplicateEmail) {
            AppError::Validation(errors) => assert!(errors.contains_key("email")),
            other => panic!("expected Validation, got: {other:?}"),
        }
    }

    #[test]
    fn token_errors_convert() {
        assert!(matches!(
            AppError::from(TokenError::Store(StoreError::NotFound)),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(TokenError::Entropy("no rng".into())),
            AppError::Internal(_)
        ));
    }

    #[test]
    fn decode_errors_convert() {
        assert!(matches!(AppError::from(DecodeError::Empty), AppError::BadRequest(_)));
        assert!(matches!(
            AppError::from(DecodeError::Local("io".into())),
            AppError::Invariant(_)
        ));
    }
}
