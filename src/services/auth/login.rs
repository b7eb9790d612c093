use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::identity_repo::IdentityStore;
use crate::repos::session_repo::{DeviceInfo, NewAccessToken, NewLogin, SessionStore};
use crate::services::auth::jwt::TokenIssuer;
use crate::services::auth::refresh_token::RefreshTokenPolicy;
use crate::services::auth::session::SessionRegistry;
use crate::services::store_guard::StoreGuard;

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub login_id: Uuid,
    pub access_token: String,
    pub expires_in: u64,
}

/// Credential login and logout.
///
/// Login opens a login record, a refresh token and the first session.
/// Logout closes the login and takes the identity offline, after which
/// no expired token of that identity refreshes.
pub struct LoginService {
    issuer: Arc<TokenIssuer>,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    registry: SessionRegistry,
    policy: RefreshTokenPolicy,
    guard: StoreGuard,
}

impl LoginService {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        policy: RefreshTokenPolicy,
        guard: StoreGuard,
    ) -> Self {
        let registry = SessionRegistry::new(sessions.clone(), guard);
        Self {
            issuer,
            identities,
            sessions,
            registry,
            policy,
            guard,
        }
    }

    pub async fn login(
        &self,
        username: &str,
        password: &str,
        device: DeviceInfo,
    ) -> Result<LoginOutcome, AppError> {
        let credentials = self
            .guard
            .run("find_credentials", || self.identities.find_credentials(username))
            .await?
            .filter(|c| c.active)
            .ok_or_else(|| {
                warn!(username, "login rejected: unknown or inactive identity");
                AppError::InvalidCredentials
            })?;

        if !verify_password(password.to_string(), credentials.password_hash.clone()).await? {
            warn!(identity_id = credentials.id, "login rejected: wrong password");
            return Err(AppError::InvalidCredentials);
        }

        let identity = self
            .guard
            .run("find_identity", || self.identities.find_identity(credentials.id))
            .await?
            .ok_or(AppError::UserNotFound)?;

        let now = Utc::now();
        let login_id = Uuid::new_v4();
        let issued = self
            .issuer
            .issue(&identity, login_id, self.issuer.ttl_seconds(), now)?;
        let refresh = self.policy.mint(now)?;

        let login = NewLogin {
            login_id,
            identity_id: identity.id,
            device,
            access: NewAccessToken {
                id: Uuid::new_v4(),
                token: issued.token.clone(),
                expires_at: issued.expires_at,
            },
            refresh,
            now,
        };
        let session = self.registry.create_session(&login).await?;

        info!(
            identity_id = identity.id,
            login_id = %login_id,
            session_id = %session.id,
            "login succeeded"
        );

        Ok(LoginOutcome {
            login_id,
            access_token: issued.token,
            expires_in: self.issuer.ttl_seconds(),
        })
    }

    pub async fn logout(&self, identity_id: i64, login_id: Uuid) -> Result<(), AppError> {
        let now = Utc::now();
        self.guard
            .run("close_login", || {
                self.sessions.close_login(identity_id, login_id, now)
            })
            .await?;

        info!(identity_id, login_id = %login_id, "logged out");
        Ok(())
    }
}

// Runs on the blocking pool.
async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()),
        Err(e) => {
            error!(error = %e, "stored password hash is malformed");
            Err(AppError::Internal)
        }
    })
    .await
    .map_err(|e| {
        error!(error = %e, "password verification task failed");
        AppError::Internal
    })?
}
