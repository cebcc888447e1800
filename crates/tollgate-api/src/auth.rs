//! # Authentication & Authorization Middleware
//!
//! ## Identity
//!
//! [`authenticate`] runs on every request. It resolves the
//! `Authorization: Bearer <token>` header through the token manager
//! (authentication scope) and stores exactly one [`CallerIdentity`] in the
//! request extensions: the principal, or `Anonymous` when no header was sent.
//! Handlers and the gates below read it back with the `FromRequestParts`
//! impl; a missing slot is a programming error, not a client error.
//!
//! ## Gates
//!
//! Applied per route with `route_layer`, checked in this order:
//!
//! | Check | Outcome |
//! |-------|---------|
//! | malformed header | 401 invalid token + `WWW-Authenticate: Bearer` |
//! | unknown or expired token | 401 invalid token + `WWW-Authenticate: Bearer` |
//! | anonymous caller | 401 authentication required |
//! | not activated | 403 inactive account |
//! | capability missing | 403 not permitted |
//!
//! Capabilities are read from the store on every check.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, VARY};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tollgate_core::validator::validate_token_plaintext;
use tollgate_core::{Permissions, Principal, Repository, StoreError, TokenScope, Validator};

use crate::error::AppError;
use crate::state::AppState;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the caller, resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    /// No credential was presented.
    Anonymous,
    /// A valid authentication token resolved to this principal.
    Principal(Principal),
}

impl CallerIdentity {
    /// Whether no credential was presented.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The principal, if any.
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Principal(p) => Some(p),
        }
    }

    /// The principal, or [`AppError::AuthenticationRequired`].
    pub fn into_principal(self) -> Result<Principal, AppError> {
        match self {
            Self::Anonymous => Err(AppError::AuthenticationRequired),
            Self::Principal(p) => Ok(p),
        }
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Reads the identity that [`authenticate`] stored. If the slot is empty the
/// router was assembled without the middleware; that is an invariant fault.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Invariant("caller identity missing from request context".into()))
    }
}

/// Check that `permissions` holds `label`.
pub fn require_capability(permissions: &Permissions, label: &str) -> Result<(), AppError> {
    if permissions.include(label) {
        Ok(())
    } else {
        Err(AppError::NotPermitted)
    }
}

// ── Authentication ──────────────────────────────────────────────────────────

async fn resolve(state: &AppState, headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(CallerIdentity::Anonymous);
    };

    let Some(token) = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) else {
        tracing::warn!("authentication failed: authorization header is not a bearer credential");
        return Err(AppError::InvalidToken);
    };

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        tracing::warn!("authentication failed: malformed bearer token");
        return Err(AppError::InvalidToken);
    }

    match state.tokens().validate(TokenScope::Authentication, token).await {
        Ok(principal) => Ok(CallerIdentity::Principal(principal)),
        Err(StoreError::NotFound) => {
            tracing::warn!("authentication failed: unknown or expired bearer token");
            Err(AppError::InvalidToken)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolve the bearer credential and store the caller identity.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let resolved = resolve(&state, request.headers()).await;
    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

// ── Gates ───────────────────────────────────────────────────────────────────

/// Reject anonymous callers.
pub async fn require_authenticated(
    identity: CallerIdentity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if identity.is_anonymous() {
        return Err(AppError::AuthenticationRequired);
    }
    Ok(next.run(request).await)
}

/// Reject anonymous and not-yet-activated callers.
pub async fn require_activated(
    identity: CallerIdentity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = identity.into_principal()?;
    if !principal.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: the store and the label to demand.
#[derive(Clone)]
pub struct PermissionGate {
    repo: Arc<dyn Repository>,
    label: &'static str,
}

impl PermissionGate {
    /// Gate on `label` against `state`'s store.
    pub fn new(state: &AppState, label: &'static str) -> Self {
        Self {
            repo: Arc::clone(&state.repo),
            label,
        }
    }
}

/// Reject callers that are anonymous, inactive, or lack the gate's label.
///
/// Use with `axum::middleware::from_fn_with_state(PermissionGate::new(..), require_permission)`.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    identity: CallerIdentity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let principal = identity.into_principal()?;
    if !principal.activated {
        return Err(AppError::InactiveAccount);
    }

    let permissions = gate.repo.permissions(principal.id).await?;
    if let Err(e) = require_capability(&permissions, gate.label) {
        tracing::warn!(
            principal = %principal.id,
            permission = gate.label,
            "authorization failed: missing permission"
        );
        return Err(e);
    }
    Ok(next.run(request).await)
}
