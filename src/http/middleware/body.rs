//! Request body decoding.
//!
//! Bodies are buffered up to the configured limit, decoded according to their
//! content type and recorded on the [`RequestContext`]. The raw bytes are put
//! back so handlers can still use their own extractors.

use std::error::Error as StdError;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::LengthLimitError;
use serde_json::{json, Map, Value};

use crate::error::ApiError;
use crate::http::request::{insert_pair, RequestContext};

/// Largest body accepted, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

/// Decoded request body, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

const MALFORMED_JSON: &str = "Invalid JSON body";

fn too_large() -> ApiError {
    ApiError::with_status(StatusCode::PAYLOAD_TOO_LARGE, "request entity too large")
}

/// Buffer and decode the request body.
pub async fn decode_body(
    State(limit): State<BodyLimit>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (mut parts, body) = request.into_parts();

    if declared_length(&parts.headers).is_some_and(|len| len > limit.0 as u64) {
        return Err(too_large());
    }

    let bytes = axum::body::to_bytes(body, limit.0)
        .await
        .map_err(read_error)?;
    let decoded = decode(&parts.headers, &bytes)?;

    if let Some(context) = parts.extensions.get::<RequestContext>() {
        context.set_body(decoded.clone());
    }
    parts.extensions.insert(ParsedBody(decoded));

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn read_error(err: axum::Error) -> ApiError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return too_large();
        }
        source = current.source();
    }
    ApiError::with_status(
        StatusCode::BAD_REQUEST,
        format!("failed to read request body: {err}"),
    )
}

/// Decode `bytes` according to the request's content type. Unknown content
/// types and empty bodies decode to `{}`.
pub fn decode(headers: &HeaderMap, bytes: &Bytes) -> Result<Value, ApiError> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if mime == "application/json" || mime.ends_with("+json") {
        serde_json::from_slice(bytes).map_err(|e| {
            ApiError::with_status(StatusCode::BAD_REQUEST, MALFORMED_JSON)
                .with_details(json!({ "reason": e.to_string() }))
        })
    } else if mime == "application/x-www-form-urlencoded" {
        let mut object = Map::new();
        for (key, value) in url::form_urlencoded::parse(bytes) {
            insert_pair(&mut object, key.into_owned(), value.into_owned());
        }
        Ok(Value::Object(object))
    } else {
        Ok(Value::Object(Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::request::capture_context;
    use axum::{
        http::HeaderValue, middleware, response::IntoResponse, routing::post, Extension, Router,
    };
    use tower::ServiceExt;

    fn headers(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn decodes_json_and_forms() {
        let json_body = Bytes::from_static(br#"{"move":"e4"}"#);
        assert_eq!(
            decode(&headers("application/json; charset=utf-8"), &json_body).unwrap(),
            json!({ "move": "e4" })
        );

        let form = Bytes::from_static(b"name=magnus&tag=a&tag=b");
        assert_eq!(
            decode(&headers("application/x-www-form-urlencoded"), &form).unwrap(),
            json!({ "name": "magnus", "tag": ["a", "b"] })
        );
    }

    #[test]
    fn other_content_types_decode_to_empty_object() {
        let bytes = Bytes::from_static(b"plain text");
        assert_eq!(decode(&headers("text/plain"), &bytes).unwrap(), json!({}));
    }

    #[test]
    fn malformed_json_is_a_400() {
        let err = decode(&headers("application/json"), &Bytes::from_static(b"{oops")).unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::Unknown {
                status: Some(StatusCode::BAD_REQUEST)
            }
        );
        assert_eq!(err.message(), MALFORMED_JSON);

        let reason = err.details().unwrap()["reason"].as_str().unwrap();
        assert!(reason.contains("line 1"));
    }

    async fn echo(Extension(ParsedBody(body)): Extension<ParsedBody>, raw: String) -> Response {
        axum::Json(json!({ "parsed": body, "raw": raw })).into_response()
    }

    fn app(limit: usize) -> Router {
        Router::new()
            .route("/echo", post(echo))
            .layer(middleware::from_fn_with_state(BodyLimit(limit), decode_body))
            .layer(middleware::from_fn(capture_context))
    }

    #[tokio::test]
    async fn handlers_see_decoded_and_raw_body() {
        let response = app(1024)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"a":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "parsed": { "a": 1 }, "raw": r#"{"a":1}"# }));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let response = app(8)
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"key":"a long value"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let err = response.extensions().get::<ApiError>().unwrap();
        assert_eq!(err.message(), "request entity too large");
    }
}
