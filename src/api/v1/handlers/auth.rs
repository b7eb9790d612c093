/*
 * Responsibility
 * - POST /auth/login (公開), POST /auth/logout, GET /auth/me (認証のみ)
 */
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};

use crate::api::v1::dto::auth::{LoginRequest, LoginResponse, MeResponse};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::middleware::auth::carrier;
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    let Json(req) = body.map_err(|e| AppError::bad_request("INVALID_BODY", e.body_text()))?;
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_CREDENTIALS_FORMAT", msg))?;

    let out = state
        .login
        .login(req.username.trim(), &req.password, carrier::device_info(&headers))
        .await?;

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            access_token: out.access_token,
            token_type: "Bearer",
            expires_in: out.expires_in,
            login_id: out.login_id,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
) -> Result<StatusCode, AppError> {
    state.login.logout(ctx.identity_id, ctx.login_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<MeResponse> {
    Json(MeResponse::from(ctx))
}
