//! Refresh of expired access tokens.
//!
//! Entered only for tokens that are correctly signed but past `exp`:
//!
//! 1. identity must exist and be active (`UserNotFound`)
//! 2. identity must be online; a logged-out identity never refreshes (`UserLoggedOut`)
//! 3. the latest active refresh token must exist and be unexpired
//! 4. the rotation itself is one store transaction serialized on the login record
//!
//! Concurrent requests presenting the same expired token converge on one
//! replacement: the first rotates, the others find the presented token already
//! replaced by the current session token and receive that token.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::identity_repo::{IdentityRow, IdentityStore};
use crate::repos::refresh_token_repo::RefreshTokenStore;
use crate::repos::session_repo::{
    NewAccessToken, RotationOutcome, SessionRow, SessionStore, TokenRotation,
};
use crate::services::auth::jwt::{AccessClaims, TokenIssuer, Verification};
use crate::services::auth::refresh_token::{RefreshIneligible, RefreshTokenPolicy};
use crate::services::store_guard::StoreGuard;

/// A successful refresh: the caller continues as `identity` with `token`.
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub identity: IdentityRow,
    pub token: String,
    pub claims: AccessClaims,
    pub session: SessionRow,
}

pub struct RefreshCoordinator {
    issuer: Arc<TokenIssuer>,
    identities: Arc<dyn IdentityStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    sessions: Arc<dyn SessionStore>,
    policy: RefreshTokenPolicy,
    guard: StoreGuard,
}

impl RefreshCoordinator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        identities: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        sessions: Arc<dyn SessionStore>,
        policy: RefreshTokenPolicy,
        guard: StoreGuard,
    ) -> Self {
        Self {
            issuer,
            identities,
            refresh_tokens,
            sessions,
            policy,
            guard,
        }
    }

    pub async fn refresh(
        &self,
        presented: &str,
        claims: &AccessClaims,
        device: Option<&str>,
    ) -> Result<Refreshed, AppError> {
        let identity_id = claims.identity_id()?;

        let identity = self
            .guard
            .run("find_identity", || self.identities.find_identity(identity_id))
            .await?
            .filter(|identity| identity.active)
            .ok_or(AppError::UserNotFound)?;

        if !identity.online {
            warn!(identity_id, login_id = %claims.lid, "refresh attempted after logout");
            return Err(AppError::UserLoggedOut);
        }

        let now = Utc::now();
        let latest = self
            .guard
            .run("latest_refresh_token", || {
                self.refresh_tokens.latest_active(identity_id)
            })
            .await?;
        let refresh_token_id = self
            .policy
            .check(latest.as_ref(), now)
            .map_err(|reason| match reason {
                RefreshIneligible::Missing => AppError::RefreshTokenMissing,
                RefreshIneligible::Expired => AppError::RefreshTokenExpired,
            })?;

        let issued = self
            .issuer
            .issue(&identity, claims.lid, self.issuer.ttl_seconds(), now)?;
        let rotation = TokenRotation {
            identity_id,
            login_id: claims.lid,
            presented_token: presented.to_string(),
            access: NewAccessToken {
                id: Uuid::new_v4(),
                token: issued.token.clone(),
                expires_at: issued.expires_at,
            },
            refresh_token_id,
            device: device.map(str::to_string),
            now,
        };

        let outcome = self
            .guard
            .run("rotate", || self.sessions.rotate(rotation.clone()))
            .await?;

        match outcome {
            RotationOutcome::Rotated(session) => {
                info!(
                    identity_id,
                    login_id = %claims.lid,
                    session_id = %session.id,
                    "access token refreshed"
                );
                Ok(Refreshed {
                    identity,
                    token: issued.token,
                    claims: issued.claims,
                    session,
                })
            }
            RotationOutcome::Converged(session) => {
                debug!(identity_id, session_id = %session.id, "refresh converged on concurrent rotation");
                match self.issuer.verify(&session.token) {
                    Verification::Valid(claims) => Ok(Refreshed {
                        identity,
                        token: session.token.clone(),
                        claims,
                        session,
                    }),
                    _ => Err(AppError::TokenExpired),
                }
            }
            RotationOutcome::Superseded => {
                debug!(identity_id, login_id = %claims.lid, "presented token superseded");
                Err(AppError::TokenExpired)
            }
        }
    }
}
