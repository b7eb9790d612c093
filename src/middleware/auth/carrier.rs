//! Where a request may carry its access token, and what it says about the client.
//!
//! Token precedence: JSON body `token`, query `token`, `x-access-token` header,
//! then `Authorization: Bearer`.

use axum::body::{Body, to_bytes};
use axum::extract::{Query, Request};
use axum::http::{HeaderMap, header};
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::auth::ACCESS_TOKEN_HEADER;
use crate::middleware::http::BODY_LIMIT_BYTES;
use crate::repos::session_repo::DeviceInfo;

#[derive(Debug, Deserialize)]
struct TokenField {
    token: Option<String>,
}

/// Buffer the body, pick the token, and hand back an equivalent request.
pub async fn take_token(req: Request) -> Result<(Request, Option<String>), AppError> {
    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, BODY_LIMIT_BYTES)
        .await
        .map_err(|_| AppError::bad_request("BODY_TOO_LARGE", "request body is too large"))?;

    let token = from_body(&bytes)
        .or_else(|| {
            Query::<TokenField>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|Query(q)| non_empty(q.token))
        })
        .or_else(|| header_token(&parts.headers));

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

fn from_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice::<TokenField>(bytes)
        .ok()
        .and_then(|f| non_empty(f.token))
}

fn header_token(headers: &HeaderMap) -> Option<String> {
    let raw = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    raw(ACCESS_TOKEN_HEADER)
        .map(str::to_string)
        .and_then(|t| non_empty(Some(t)))
        .or_else(|| {
            raw(header::AUTHORIZATION.as_str())
                .and_then(|v| v.strip_prefix("Bearer "))
                .and_then(|t| non_empty(Some(t.to_string())))
        })
}

fn non_empty(token: Option<String>) -> Option<String> {
    token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn device_info(headers: &HeaderMap) -> DeviceInfo {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let client_addr = text("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| text("x-real-ip"));

    DeviceInfo {
        device: text(header::USER_AGENT.as_str()),
        browser: text("sec-ch-ua"),
        client_addr,
    }
}
