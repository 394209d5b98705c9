// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode

use axum::body::to_bytes;
use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, enabled, Level};

use crate::common::helpers::safe_token_log;

/// JSON keys whose values never reach the logs in clear
const MASKED_KEYS: &[&str] = &["token", "invite_link"];

/// Logs JSON request/response bodies at `debug`.
///
/// Multipart uploads are passed through untouched and access tokens are masked.
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    if !enabled!(Level::DEBUG) || is_multipart(request.headers()) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(rendered) = render_body(&bytes) {
        debug!(
            method = %parts.method,
            uri = %parts.uri,
            request_body = %rendered,
            "Request"
        );
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(rendered) = render_body(&bytes) {
        debug!(status = %parts.status, response_body = %rendered, "Response");
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("multipart/"))
        .unwrap_or(false)
}

/// Pretty JSON with secrets masked, or the raw text; `None` for empty or binary bodies
fn render_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;

    match serde_json::from_str::<Value>(text) {
        Ok(mut json) => {
            mask_secrets(&mut json);
            Some(serde_json::to_string_pretty(&json).unwrap_or_else(|_| text.to_string()))
        }
        Err(_) => Some(text.to_string()),
    }
}

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                match entry {
                    Value::String(secret) if MASKED_KEYS.contains(&key.as_str()) => {
                        *secret = safe_token_log(secret);
                    }
                    other => mask_secrets(other),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}
