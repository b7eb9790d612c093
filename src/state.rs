/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - gate: token 検証 / refresh / 権限 / data scope
 *   - login: login / logout
 *   - entities: gate 通過後の下流 (EntityGateway)
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::repos::identity_repo::IdentityStore;
use crate::repos::privilege_repo::PrivilegeStore;
use crate::repos::refresh_token_repo::RefreshTokenStore;
use crate::repos::session_repo::SessionStore;
use crate::services::auth::{
    LoginService, RefreshCoordinator, RefreshTokenPolicy, SessionRegistry, TokenIssuer,
};
use crate::services::authz::{DataScopeResolver, ModuleRegistry, PrivilegeResolver};
use crate::services::gate::AuthGate;
use crate::services::handoff::EntityGateway;
use crate::services::store_guard::StoreGuard;

/// Store implementations the services run against (Postgres, or in-memory in tests).
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub privileges: Arc<dyn PrivilegeStore>,
    pub entities: Arc<dyn EntityGateway>,
}

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AuthGate>,
    pub login: Arc<LoginService>,
    pub entities: Arc<dyn EntityGateway>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        issuer: Arc<TokenIssuer>,
        policy: RefreshTokenPolicy,
        modules: ModuleRegistry,
        guard: StoreGuard,
    ) -> Self {
        let refresh = RefreshCoordinator::new(
            issuer.clone(),
            stores.identities.clone(),
            stores.refresh_tokens.clone(),
            stores.sessions.clone(),
            policy,
            guard,
        );
        let gate = AuthGate::new(
            issuer.clone(),
            stores.identities.clone(),
            SessionRegistry::new(stores.sessions.clone(), guard),
            refresh,
            PrivilegeResolver::new(modules, stores.privileges.clone(), guard),
            DataScopeResolver::new(stores.privileges, guard),
            guard,
        );
        let login = LoginService::new(issuer, stores.identities, stores.sessions, policy, guard);

        Self {
            gate: Arc::new(gate),
            login: Arc::new(login),
            entities: stores.entities,
        }
    }
}
