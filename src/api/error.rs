//! Error envelope middleware.
//!
//! Handlers answer errors as bare status codes or plain-text messages; this
//! layer rewrites every non-2xx plain response into the JSON envelope
//! `{statusCode, timestamp, path, message}`. Responses that already carry a
//! JSON body pass through untouched.

use axum::{
    body::to_bytes,
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

const BODY_LIMIT: usize = 64 * 1024;

pub(crate) async fn envelope(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let already_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if already_json {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, BODY_LIMIT).await.unwrap_or_default();
    let message = if bytes.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    let payload = json!({
        "statusCode": status.as_u16(),
        "timestamp": Utc::now().to_rfc3339(),
        "path": path,
        "message": message,
    });

    let mut wrapped = (status, Json(payload)).into_response();
    // Keep handler headers like Retry-After; the body headers are replaced.
    for (name, value) in &parts.headers {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            wrapped.headers_mut().insert(name.clone(), value.clone());
        }
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use axum::{
        http::{header::RETRY_AFTER, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "Task not found") }),
            )
            .route(
                "/limited",
                get(|| async {
                    let mut headers = axum::http::HeaderMap::new();
                    headers.insert(RETRY_AFTER, axum::http::HeaderValue::from_static("60"));
                    (StatusCode::TOO_MANY_REQUESTS, headers, "Slow down")
                }),
            )
            .route("/ok", get(|| async { Json(json!({"fine": true})) }))
            .layer(middleware::from_fn(envelope))
    }

    async fn body_json(response: Response) -> Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), BODY_LIMIT).await?;
        serde_json::from_slice(&bytes).context("invalid JSON body")
    }

    #[tokio::test]
    async fn plain_error_becomes_envelope() -> Result<()> {
        let response = app()
            .oneshot(Request::builder().uri("/missing").body(axum::body::Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let value = body_json(response).await?;
        assert_eq!(value["statusCode"], 404);
        assert_eq!(value["path"], "/missing");
        assert_eq!(value["message"], "Task not found");
        assert!(value["timestamp"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn retry_after_header_survives_wrapping() -> Result<()> {
        let response = app()
            .oneshot(Request::builder().uri("/limited").body(axum::body::Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok()),
            Some("60")
        );

        let value = body_json(response).await?;
        assert_eq!(value["message"], "Slow down");
        Ok(())
    }

    #[tokio::test]
    async fn success_responses_pass_through() -> Result<()> {
        let response = app()
            .oneshot(Request::builder().uri("/ok").body(axum::body::Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);

        let value = body_json(response).await?;
        assert_eq!(value, json!({"fine": true}));
        Ok(())
    }
}
