//! # tollgate-api: Axum API Service
//!
//! The HTTP layer for Tollgate, built on Axum/Tower/Tokio. Assembles the
//! user, token and healthcheck routers into a single application behind a
//! shared middleware stack.
//!
//! ## Routes
//!
//! - `/v1/healthcheck`: liveness probe (unauthenticated)
//! - `/v1/users/*`: registration, activation, password reset, profile,
//!   capability grants
//! - `/v1/tokens/*`: authentication, activation and password-reset tokens
//!
//! ## Middleware Stack (Tower), outermost first
//!
//! CatchPanic → Trace → CORS → RateLimit → ErrorBoundary → Authenticate
//!
//! Per-route gates (`require_activated`, `require_permission`) are attached
//! with `route_layer` inside the routers.
//!
//! ## Crate Policy
//!
//! - All errors map to structured JSON responses via [`AppError`].
//! - Request bodies go through the strict codec in [`json`]; unknown fields,
//!   trailing values and oversized bodies are rejected.
//! - Server faults are logged through the process [`Logger`](tollgate_core::Logger)
//!   and never described to the client.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod json;
pub mod mailer;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod tasks;

use std::any::Any;

use axum::http::header::CONNECTION;
use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tollgate_core::{Logger, Properties};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use error::AppError;
pub use state::AppState;

/// Build the application router with every route and the shared middleware.
pub fn app(state: AppState) -> Router {
    let logger = state.logger.clone();

    Router::new()
        .merge(routes::router(&state))
        .fallback(routes::not_found)
        .layer(from_fn_with_state(state.clone(), auth::authenticate))
        .layer(from_fn_with_state(state.clone(), error::error_boundary))
        .layer(from_fn_with_state(
            state.limiter.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(middleware::cors::layer(&state.config.cors_trusted_origins))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(
            move |payload: Box<dyn Any + Send + 'static>| panic_response(&logger, payload),
        ))
        .with_state(state)
}

/// Log a handler panic and answer with the generic 500.
fn panic_response(logger: &Logger, payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = tasks::panic_message(payload.as_ref());
    logger.error(format!("handler panicked: {message}"), Properties::new());

    let mut response = AppError::Internal(message).into_response();
    response.extensions_mut().remove::<error::FaultDetail>();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}
