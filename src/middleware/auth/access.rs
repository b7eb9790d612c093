//! access token 検証 → (entity route なら) module 権限 / data scope 判定 → AuthCtx を extensions に入れる
//!
//! - token は body / query / `x-access-token` / Bearer の順で探す
//! - 期限切れ token が refresh された場合は新しい token を `x-access-token` response header で返す
//!   (認可が失敗した場合も返す。古い token はもう使えないため)

use axum::{
    Router,
    extract::{RawPathParams, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::middleware::auth::{ACCESS_TOKEN_HEADER, carrier};
use crate::services::authz::ActionRule;
use crate::services::authz::routes::MODULE_PARAM;
use crate::services::gate::Authenticated;
use crate::state::AppState;

/// State of one entity route's gate: the shared app state plus the route's rule.
#[derive(Clone)]
pub struct GuardedRoute {
    state: AppState,
    rule: ActionRule,
}

impl GuardedRoute {
    pub fn new(state: AppState, rule: ActionRule) -> Self {
        Self { state, rule }
    }
}

/// Authentication only (no module), for session endpoints such as logout.
pub fn authenticated(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // route_layer: unmatched paths stay 404 instead of 401
    router.route_layer(middleware::from_fn_with_state(state, authenticate_middleware))
}

async fn authenticate_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut req, token) = carrier::take_token(req).await?;
    let device = carrier::device_info(req.headers());

    let who = state
        .gate
        .authenticate(token.as_deref(), device.device.as_deref())
        .await
        .inspect_err(|e| warn!(code = e.code(), "authentication failed"))?;

    req.extensions_mut().insert(AuthCtx::new(&who));
    let response = next.run(req).await;

    Ok(with_refreshed_token(response, &who))
}

/// Full gate for an entity route: authenticate, then authorize against the route's rule.
pub async fn guard_entity(
    State(route): State<GuardedRoute>,
    params: RawPathParams,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut req, token) = carrier::take_token(req).await?;
    let device = carrier::device_info(req.headers());
    let gate = &route.state.gate;

    let who = gate
        .authenticate(token.as_deref(), device.device.as_deref())
        .await
        .inspect_err(|e| warn!(code = e.code(), "authentication failed"))?;

    let module = params
        .iter()
        .find(|(key, _)| *key == MODULE_PARAM)
        .map(|(_, value)| value)
        .unwrap_or_default();

    let grant = match gate.authorize(&who, module, route.rule).await {
        Ok(grant) => grant,
        Err(e) => {
            warn!(
                identity_id = who.identity.id,
                module,
                code = e.code(),
                "authorization failed"
            );
            return Ok(with_refreshed_token(e.into_response(), &who));
        }
    };

    req.extensions_mut().insert(AuthCtx::new(&who).with_grant(grant));
    let response = next.run(req).await;

    Ok(with_refreshed_token(response, &who))
}

fn with_refreshed_token(mut response: Response, who: &Authenticated) -> Response {
    let Some(token) = who.refreshed_token.as_deref() else {
        return response;
    };

    match HeaderValue::from_str(token) {
        Ok(value) => {
            response.headers_mut().insert(ACCESS_TOKEN_HEADER, value);
            response
        }
        Err(e) => {
            error!(error = %e, "refreshed token is not a valid header value");
            AppError::Internal.into_response()
        }
    }
}
