//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area. They are
//! merged here and wrapped in the shared middleware by [`crate::app`].
//!
//! - `/v1/healthcheck`: liveness and build info (unauthenticated)
//! - `/v1/users/*`: registration, activation, password reset, profile, grants
//! - `/v1/tokens/*`: authentication, activation and password-reset tokens

pub mod health;
pub mod tokens;
pub mod users;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Router;
use serde::Serialize;

use crate::error::AppError;
use crate::json::{write_json, Envelope};
use crate::state::AppState;

/// Every API route.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(users::router(state))
        .merge(tokens::router())
}

/// Fallback for unmatched paths.
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// `{"<key>": payload}` with `status`.
pub(crate) fn reply(
    status: StatusCode,
    key: &str,
    payload: impl Serialize,
) -> Result<Response, AppError> {
    write_json(status, &Envelope::new().with(key, payload)?, HeaderMap::new())
}
