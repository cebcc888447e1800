//! # Token Routes
//!
//! Routes (all anonymous):
//! - POST /v1/tokens/authentication: exchange email + password for a bearer token
//! - POST /v1/tokens/password-reset: mail a password-reset token
//! - POST /v1/tokens/activation: mail a fresh activation token
//!
//! Unknown email and wrong password are indistinguishable on the
//! authentication route. The two mailing routes answer 202 as soon as the
//! token is minted; delivery happens on the background task supervisor.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tollgate_core::validator::{validate_email, validate_password_plaintext};
use tollgate_core::{Principal, StoreError, TokenScope, Validator};

use super::reply;
use crate::error::AppError;
use crate::extractors::{Valid, Validate};
use crate::mailer::{send_in_background, TOKEN_ACTIVATION, TOKEN_PASSWORD_RESET};
use crate::state::AppState;

/// Credentials body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

impl Validate for CredentialsRequest {
    fn validate(&self, v: &mut Validator) {
        validate_email(v, &self.email);
        validate_password_plaintext(v, &self.password);
    }
}

/// Body naming the account a token should be mailed to.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailRequest {
    pub email: String,
}

impl Validate for EmailRequest {
    fn validate(&self, v: &mut Validator) {
        validate_email(v, &self.email);
    }
}

/// Build the tokens router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tokens/authentication", post(create_authentication_token))
        .route("/v1/tokens/password-reset", post(create_password_reset_token))
        .route("/v1/tokens/activation", post(create_activation_token))
}

/// Principal for `email`, or a 422 on the `email` field.
async fn principal_for_email(state: &AppState, email: &str) -> Result<Principal, AppError> {
    match state.repo.principal_by_email(email).await {
        Ok(principal) => Ok(principal),
        Err(StoreError::NotFound) => Err(AppError::invalid_field(
            "email",
            "no matching email address found",
        )),
        Err(e) => Err(e.into()),
    }
}

async fn create_authentication_token(
    State(state): State<AppState>,
    Valid(req): Valid<CredentialsRequest>,
) -> Result<Response, AppError> {
    let principal = match state.repo.principal_by_email(&req.email).await {
        Ok(principal) => principal,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !principal.password.matches(&req.password)? {
        return Err(AppError::InvalidCredentials);
    }

    let token = state
        .tokens()
        .mint(
            principal.id,
            TokenScope::Authentication.default_ttl(),
            TokenScope::Authentication,
        )
        .await?;

    reply(StatusCode::CREATED, "authentication_token", &token)
}

async fn create_password_reset_token(
    State(state): State<AppState>,
    Valid(req): Valid<EmailRequest>,
) -> Result<Response, AppError> {
    let principal = principal_for_email(&state, &req.email).await?;
    if !principal.activated {
        return Err(AppError::invalid_field(
            "email",
            "user account must be activated",
        ));
    }

    let token = state
        .tokens()
        .mint(
            principal.id,
            TokenScope::PasswordReset.default_ttl(),
            TokenScope::PasswordReset,
        )
        .await?;

    send_in_background(
        &state,
        principal.email,
        TOKEN_PASSWORD_RESET,
        serde_json::json!({ "password_reset_token": token.plaintext() }),
    );

    reply(
        StatusCode::ACCEPTED,
        "message",
        "an email will be sent to you containing password reset instructions",
    )
}

async fn create_activation_token(
    State(state): State<AppState>,
    Valid(req): Valid<EmailRequest>,
) -> Result<Response, AppError> {
    let principal = principal_for_email(&state, &req.email).await?;
    if principal.activated {
        return Err(AppError::invalid_field(
            "email",
            "user has already been activated",
        ));
    }

    let token = state
        .tokens()
        .mint(
            principal.id,
            TokenScope::Activation.default_ttl(),
            TokenScope::Activation,
        )
        .await?;

    send_in_background(
        &state,
        principal.email,
        TOKEN_ACTIVATION,
        serde_json::json!({ "activation_token": token.plaintext() }),
    );

    reply(
        StatusCode::ACCEPTED,
        "message",
        "an email will be sent to you containing activation instructions",
    )
}
