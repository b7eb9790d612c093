//! Request gate: token → identity → module privilege → data scope.
//!
//! A valid token is checked against the login's active session and the
//! identity, with no writes. Only an expired (but authentic) token goes to the
//! refresh coordinator.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::identity_repo::{IdentityRow, IdentityStore};
use crate::repos::privilege_repo::ModuleRow;
use crate::services::auth::{RefreshCoordinator, SessionRegistry, TokenIssuer, Verification};
use crate::services::authz::{
    Action, ActionRule, DataScope, DataScopeResolver, PrivilegeResolver,
};
use crate::services::store_guard::StoreGuard;

/// Who the request runs as.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: IdentityRow,
    pub login_id: Uuid,
    pub session_id: Uuid,
    /// Set when the presented token was expired and has been replaced.
    pub refreshed_token: Option<String>,
}

/// What the request may do within one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    #[serde(skip)]
    pub module: ModuleRow,
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<DataScope>,
}

pub struct AuthGate {
    issuer: Arc<TokenIssuer>,
    identities: Arc<dyn IdentityStore>,
    sessions: SessionRegistry,
    refresh: RefreshCoordinator,
    privileges: PrivilegeResolver,
    scopes: DataScopeResolver,
    guard: StoreGuard,
}

impl AuthGate {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        identities: Arc<dyn IdentityStore>,
        sessions: SessionRegistry,
        refresh: RefreshCoordinator,
        privileges: PrivilegeResolver,
        scopes: DataScopeResolver,
        guard: StoreGuard,
    ) -> Self {
        Self {
            issuer,
            identities,
            sessions,
            refresh,
            privileges,
            scopes,
            guard,
        }
    }

    pub async fn authenticate(
        &self,
        token: Option<&str>,
        device: Option<&str>,
    ) -> Result<Authenticated, AppError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::NoAuthorizationProvided)?;

        match self.issuer.verify(token) {
            Verification::Invalid => Err(AppError::InvalidToken),
            Verification::Valid(claims) => {
                let session = self.sessions.find_active_session(claims.lid, token).await?;
                let identity_id = claims.identity_id()?;
                let identity = self
                    .guard
                    .run("find_identity", || self.identities.find_identity(identity_id))
                    .await?
                    .filter(|identity| identity.active)
                    .ok_or(AppError::UserNotFound)?;

                Ok(Authenticated {
                    identity,
                    login_id: claims.lid,
                    session_id: session.id,
                    refreshed_token: None,
                })
            }
            Verification::Expired(claims) => {
                debug!(login_id = %claims.lid, "access token expired, refreshing");
                let refreshed = self.refresh.refresh(token, &claims, device).await?;

                Ok(Authenticated {
                    identity: refreshed.identity,
                    login_id: refreshed.claims.lid,
                    session_id: refreshed.session.id,
                    refreshed_token: Some(refreshed.token),
                })
            }
        }
    }

    /// Module privilege for `route_name` under `rule`, plus the data scope for reads.
    pub async fn authorize(
        &self,
        who: &Authenticated,
        route_name: &str,
        rule: ActionRule,
    ) -> Result<Grant, AppError> {
        let role_id = who.identity.role_id;
        let decision = self.privileges.resolve(role_id, route_name, rule).await?;

        let scope = match decision.action {
            Some(action) if action.is_read() => Some(
                self.scopes
                    .resolve(role_id, &decision.module, who.identity.id)
                    .await?,
            ),
            _ => None,
        };

        Ok(Grant {
            module: decision.module,
            action: decision.action,
            scope,
        })
    }
}
