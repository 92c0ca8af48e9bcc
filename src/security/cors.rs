//! Cross-origin policy.

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE, COOKIE},
    header::InvalidHeaderValue,
    HeaderValue, Method,
};
use tower_http::cors::CorsLayer;

use crate::config::schema::CorsConfig;

/// One allowed origin, credentials on.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, InvalidHeaderValue> {
    let origin = HeaderValue::from_str(config.frontend_url.trim_end_matches('/'))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, COOKIE]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = CorsConfig {
            frontend_url: "http://localhost:5173/".to_string(),
        };
        Router::new()
            .route("/api/health", get(|| async { "ok" }))
            .layer(cors_layer(&config).unwrap())
    }

    #[tokio::test]
    async fn allowed_origin_is_echoed_with_credentials() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn grant_always_names_the_frontend() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .header(header::ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }

    #[test]
    fn origin_must_be_a_valid_header_value() {
        let config = CorsConfig {
            frontend_url: "http://bad\norigin".to_string(),
        };
        assert!(cors_layer(&config).is_err());
    }
}
