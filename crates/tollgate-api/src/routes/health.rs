//! Liveness probe. Unauthenticated; reports the environment and build version.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::error::AppError;
use crate::json::{write_json, Envelope};
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct SystemInfo {
    environment: String,
    version: &'static str,
}

/// Build the healthcheck router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/healthcheck", get(healthcheck))
}

async fn healthcheck(State(state): State<AppState>) -> Result<Response, AppError> {
    let envelope = Envelope::new().with("status", "available")?.with(
        "system_info",
        SystemInfo {
            environment: state.config.env.to_string(),
            version: env!("CARGO_PKG_VERSION"),
        },
    )?;
    write_json(StatusCode::OK, &envelope, HeaderMap::new())
}
