use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::refresh_token_repo::{NewRefreshToken, RefreshTokenRow};
use crate::services::auth::jwt::expiry;

/// Mints opaque refresh tokens and judges whether a stored one may still refresh.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTokenPolicy {
    ttl_seconds: u64,
}

/// Why a stored refresh token cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshIneligible {
    Missing,
    Expired,
}

impl RefreshTokenPolicy {
    pub fn new(ttl_seconds: u64) -> Self {
        Self { ttl_seconds }
    }

    /// Mint a new refresh token row.
    ///
    /// Refresh tokens never leave the server: the gate looks up the identity's
    /// latest active row when an access token expires. The stored hash of a
    /// random value is only an audit fingerprint that tells rows apart in logs
    /// and exports without revealing anything reusable.
    pub fn mint(&self, now: DateTime<Utc>) -> Result<NewRefreshToken, AppError> {
        let raw = generate_refresh_token()?;
        let expires_at = expiry(now, self.ttl_seconds).ok_or_else(|| {
            error!(ttl_seconds = self.ttl_seconds, "refresh token ttl out of range");
            AppError::Internal
        })?;

        debug!(
            ttl_seconds = self.ttl_seconds,
            expires_at = %expires_at,
            "Issuing refresh token"
        );

        Ok(NewRefreshToken {
            id: Uuid::new_v4(),
            token_hash: hash_refresh_token(&raw),
            expires_at,
        })
    }

    /// Latest active row → usable refresh-token id.
    pub fn check(
        &self,
        latest: Option<&RefreshTokenRow>,
        now: DateTime<Utc>,
    ) -> Result<Uuid, RefreshIneligible> {
        match latest {
            None => Err(RefreshIneligible::Missing),
            Some(row) if !row.active => Err(RefreshIneligible::Missing),
            Some(row) if row.expires_at <= now => Err(RefreshIneligible::Expired),
            Some(row) => Ok(row.id),
        }
    }
}

fn generate_refresh_token() -> Result<String, AppError> {
    // 32 bytes of entropy -> URL-safe base64 without padding.
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| {
        error!(error = %e, "getrandom failed");
        AppError::Internal
    })?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn hash_refresh_token(token: &str) -> Vec<u8> {
    // sha256(token) -> raw 32 bytes (stored as BYTEA)
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
