//! # User Routes
//!
//! Routes:
//! - POST   /v1/users: register (anonymous)
//! - PUT    /v1/users/activated: redeem an activation token (anonymous)
//! - PUT    /v1/users/password: redeem a password-reset token (anonymous)
//! - GET    /v1/users/me: own profile (activated)
//! - PATCH  /v1/users/me: partial profile update (activated)
//! - POST   /v1/users/:id/permissions: grant capabilities (`permissions:grant`)

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use tollgate_core::validator::{
    validate_email, validate_password_plaintext, validate_principal, validate_token_plaintext,
    MAX_NAME_BYTES,
};
use tollgate_core::{
    NewPrincipal, PasswordHash, PrincipalId, StoreError, TokenScope, Validator,
};
use uuid::Uuid;

use super::reply;
use crate::auth::{require_activated, require_permission, CallerIdentity, PermissionGate};
use crate::error::AppError;
use crate::extractors::{Valid, Validate};
use crate::mailer::{send_in_background, USER_WELCOME};
use crate::state::AppState;

/// Capability required to grant capabilities.
pub const GRANT_PERMISSION: &str = "permissions:grant";

// ── Request Types ───────────────────────────────────────────────────────────

/// Registration body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterRequest {
    fn validate(&self, v: &mut Validator) {
        validate_principal(v, &self.name, &self.email, Some(&self.password));
    }
}

/// Activation body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateRequest {
    pub token: String,
}

impl Validate for ActivateRequest {
    fn validate(&self, v: &mut Validator) {
        validate_token_plaintext(v, &self.token);
    }
}

/// Password reset body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub token: String,
}

impl Validate for ResetPasswordRequest {
    fn validate(&self, v: &mut Validator) {
        validate_password_plaintext(v, &self.password);
        validate_token_plaintext(v, &self.token);
    }
}

/// Profile update body. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Validate for UpdateProfileRequest {
    fn validate(&self, v: &mut Validator) {
        if let Some(name) = &self.name {
            v.check(!name.is_empty(), "name", "must be provided");
            v.check(
                name.len() <= MAX_NAME_BYTES,
                "name",
                "must not be more than 500 bytes long",
            );
        }
        if let Some(email) = &self.email {
            validate_email(v, email);
        }
    }
}

/// Capability grant body.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrantRequest {
    pub permissions: Vec<String>,
}

impl Validate for GrantRequest {
    fn validate(&self, v: &mut Validator) {
        v.check(
            !self.permissions.is_empty(),
            "permissions",
            "must contain at least 1 entry",
        );
        let unique: BTreeSet<&str> = self.permissions.iter().map(String::as_str).collect();
        v.check(
            unique.len() == self.permissions.len(),
            "permissions",
            "must not contain duplicate values",
        );
        v.check(
            self.permissions.iter().all(|p| is_capability_label(p)),
            "permissions",
            "must only contain labels of the form resource:action",
        );
    }
}

/// `<resource>:<action>`, both halves non-empty, no whitespace.
fn is_capability_label(label: &str) -> bool {
    match label.split_once(':') {
        Some((resource, action)) => {
            !resource.is_empty()
                && !action.is_empty()
                && !action.contains(':')
                && !label.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the users router.
pub fn router(state: &AppState) -> Router<AppState> {
    let profile = Router::new()
        .route("/v1/users/me", get(show_profile).patch(update_profile))
        .route_layer(from_fn(require_activated));

    let grants = Router::new()
        .route("/v1/users/:id/permissions", post(grant_permissions))
        .route_layer(from_fn_with_state(
            PermissionGate::new(state, GRANT_PERMISSION),
            require_permission,
        ));

    Router::new()
        .route("/v1/users", post(register))
        .route("/v1/users/activated", put(activate))
        .route("/v1/users/password", put(reset_password))
        .merge(profile)
        .merge(grants)
}

// ── Handlers ────────────────────────────────────────────────────────────────

async fn register(
    State(state): State<AppState>,
    Valid(req): Valid<RegisterRequest>,
) -> Result<Response, AppError> {
    let password = PasswordHash::set(&req.password)?;
    let principal = state
        .repo
        .insert_principal(NewPrincipal {
            name: req.name,
            email: req.email,
            password,
        })
        .await?;

    let principal = state
        .repo
        .add_permissions(&principal, &state.config.default_permissions)
        .await?;

    let token = state
        .tokens()
        .mint(principal.id, TokenScope::Activation.default_ttl(), TokenScope::Activation)
        .await?;

    send_in_background(
        &state,
        principal.email.clone(),
        USER_WELCOME,
        serde_json::json!({
            "activation_token": token.plaintext(),
            "principal_id": principal.id,
        }),
    );

    reply(StatusCode::CREATED, "user", &principal)
}

async fn activate(
    State(state): State<AppState>,
    Valid(req): Valid<ActivateRequest>,
) -> Result<Response, AppError> {
    let mut principal = match state.tokens().validate(TokenScope::Activation, &req.token).await {
        Ok(principal) => principal,
        Err(StoreError::NotFound) => {
            return Err(AppError::invalid_field(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    principal.activated = true;
    let principal = state.repo.update_principal(&principal).await?;
    state
        .tokens()
        .invalidate(TokenScope::Activation, principal.id)
        .await?;

    reply(StatusCode::OK, "user", &principal)
}

async fn reset_password(
    State(state): State<AppState>,
    Valid(req): Valid<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let mut principal = match state
        .tokens()
        .validate(TokenScope::PasswordReset, &req.token)
        .await
    {
        Ok(principal) => principal,
        Err(StoreError::NotFound) => {
            return Err(AppError::invalid_field(
                "token",
                "invalid or expired password reset token",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    principal.password = PasswordHash::set(&req.password)?;
    let principal = state.repo.update_principal(&principal).await?;
    state
        .tokens()
        .invalidate(TokenScope::PasswordReset, principal.id)
        .await?;

    reply(
        StatusCode::OK,
        "message",
        "your password was successfully reset",
    )
}

async fn show_profile(identity: CallerIdentity) -> Result<Response, AppError> {
    let principal = identity.into_principal()?;
    reply(StatusCode::OK, "user", &principal)
}

async fn update_profile(
    State(state): State<AppState>,
    identity: CallerIdentity,
    Valid(req): Valid<UpdateProfileRequest>,
) -> Result<Response, AppError> {
    let mut principal = identity.into_principal()?;
    if let Some(name) = req.name {
        principal.name = name;
    }
    if let Some(email) = req.email {
        principal.email = email;
    }

    let principal = state.repo.update_principal(&principal).await?;
    reply(StatusCode::OK, "user", &principal)
}

async fn grant_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Valid(req): Valid<GrantRequest>,
) -> Result<Response, AppError> {
    let id = Uuid::parse_str(&id)
        .map(PrincipalId::from_uuid)
        .map_err(|_| AppError::NotFound)?;

    let principal = state.repo.principal_by_id(id).await?;
    let principal = state
        .repo
        .add_permissions(&principal, &req.permissions)
        .await?;
    tracing::info!(
        principal = %principal.id,
        version = principal.version,
        permissions = ?req.permissions,
        "granted permissions"
    );

    let permissions = state.repo.permissions(principal.id).await?;
    reply(StatusCode::OK, "permissions", &permissions)
}
