/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /auth/login は公開、/auth/logout・/auth/me は認証のみ
 * - entity route は RouteTable から組み立て、route ごとに action rule 付きの gate を掛ける
 */
use axum::{
    Router, middleware,
    routing::{get, on, post},
};

use crate::api::v1::handlers::{auth, entity};
use crate::middleware::auth::access::{self, GuardedRoute};
use crate::services::authz::RouteTable;
use crate::state::AppState;

pub fn routes(state: AppState, table: &RouteTable) -> Router<AppState> {
    let public = Router::new().route("/auth/login", post(auth::login));

    let session = access::authenticated(
        Router::new()
            .route("/auth/logout", post(auth::logout))
            .route("/auth/me", get(auth::me)),
        state.clone(),
    );

    let entities = table
        .entries()
        .fold(Router::new(), |router, (filter, route)| {
            let gate = middleware::from_fn_with_state(
                GuardedRoute::new(state.clone(), route.rule),
                access::guard_entity,
            );
            router.route(route.pattern, on(filter, entity::dispatch).route_layer(gate))
        });

    public.merge(session).merge(entities)
}
