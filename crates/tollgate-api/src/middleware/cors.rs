//! Cross-origin gate. Only listed origins are echoed back; preflight requests
//! are answered directly by the layer.

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the CORS layer for the given trusted origins.
pub fn layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid trusted origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/v1/healthcheck", get(|| async { "ok" }))
            .layer(layer(&["https://trusted.example".to_string()]))
    }

    #[tokio::test]
    async fn trusted_origin_is_echoed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/healthcheck")
                    .header("origin", "https://trusted.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "https://trusted.example"
        );
    }

    #[tokio::test]
    async fn untrusted_origin_gets_no_grant() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/v1/healthcheck")
                    .header("origin", "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }

    #[tokio::test]
    async fn preflight_is_answered_by_the_gate() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/v1/healthcheck")
                    .header("origin", "https://trusted.example")
                    .header("access-control-request-method", "PUT")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let methods = response.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("PUT"));
        assert!(methods.contains("PATCH"));
    }

    #[test]
    fn invalid_origins_are_skipped() {
        let _ = layer(&["bad\norigin".to_string(), "https://ok.example".to_string()]);
    }
}
