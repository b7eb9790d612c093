/*
 * Responsibility
 * - login / me の request/response DTO
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::v1::extractors::AuthCtx;
use crate::repos::identity_repo::ActorKind;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.username.trim().is_empty() {
            return Err("username is required");
        }
        if self.password.is_empty() {
            return Err("password is required");
        }
        if self.username.len() > 128 || self.password.len() > 1024 {
            return Err("credentials are too long");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// Seconds until expiry.
    pub expires_in: u64,
    pub login_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    pub identity_id: i64,
    pub display_name: String,
    pub actor: ActorKind,
    pub role_id: i64,
    pub login_id: Uuid,
    pub session_id: Uuid,
}

impl From<AuthCtx> for MeResponse {
    fn from(ctx: AuthCtx) -> Self {
        Self {
            identity_id: ctx.identity_id,
            display_name: ctx.display_name,
            actor: ctx.actor,
            role_id: ctx.role_id,
            login_id: ctx.login_id,
            session_id: ctx.session_id,
        }
    }
}
