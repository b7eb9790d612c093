/*
 * Responsibility
 * - /{module}/... の entity route handler (全 action 共通)
 * - gate が入れた Grant を Handoff に詰めて EntityGateway へ渡す
 */
use axum::{
    Json,
    body::Bytes,
    extract::{Query, RawPathParams, State, rejection::QueryRejection},
};
use serde_json::Value;
use tracing::error;

use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::handoff::{Handoff, Page};
use crate::state::AppState;

const RECORD_PARAM: &str = "id";

pub async fn dispatch(
    State(state): State<AppState>,
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    params: RawPathParams,
    page: Result<Query<Page>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let Some(grant) = ctx.grant else {
        error!(identity_id = ctx.identity_id, "entity route reached without a grant");
        return Err(AppError::Internal);
    };
    let Query(page) = page.map_err(|e| AppError::bad_request("INVALID_QUERY", e.body_text()))?;

    let record_id = params
        .iter()
        .find(|(key, _)| *key == RECORD_PARAM)
        .map(|(_, value)| value.to_string());

    let handoff = Handoff {
        module: grant.module.route_name,
        module_id: grant.module.id,
        action: grant.action,
        scope: grant.scope,
        identity_id: ctx.identity_id,
        record_id,
        page,
        body: parse_body(&body)?,
    };

    let out = state.entities.handle(handoff).await?;
    Ok(Json(out))
}

// The `token` field never reaches the entity layer.
fn parse_body(bytes: &[u8]) -> Result<Option<Value>, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AppError::bad_request("INVALID_BODY", e.to_string()))?;
    if let Some(object) = value.as_object_mut() {
        object.remove("token");
    }

    Ok(Some(value))
}
