use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::identity_repo::{ActorKind, IdentityRow};

/// Access token claims.
///
/// - `sub` is the identity id (decimal string)
/// - `lid` is the login record the token was issued under; it keys the session lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub name: String,
    pub actor: ActorKind,
    pub lid: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    pub fn identity_id(&self) -> Result<i64, AppError> {
        self.sub.parse().map_err(|_| AppError::InvalidToken)
    }
}

/// Outcome of verifying a presented access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(AccessClaims),
    /// Correctly signed but past `exp`. The only outcome that may lead to a refresh.
    Expired(AccessClaims),
    Invalid,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: AccessClaims,
    pub expires_at: DateTime<Utc>,
}

/// HS256 access-token issuer and verifier.
///
/// - Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct TokenIssuer {
    issuer: String,
    audience: String,
    ttl_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expired_validation: Validation,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(
        secret: &[u8],
        issuer: String,
        audience: String,
        ttl_seconds: u64,
        leeway_seconds: u64,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = leeway_seconds;

        // Same checks minus `exp`, used only after the strict pass reported ExpiredSignature.
        let mut expired_validation = validation.clone();
        expired_validation.validate_exp = false;

        Self {
            issuer,
            audience,
            ttl_seconds,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            expired_validation,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Issue an access token for `identity` under login `login_id`, valid for `ttl_seconds`.
    pub fn issue(
        &self,
        identity: &IdentityRow,
        login_id: Uuid,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, AppError> {
        let expires_at = expiry(now, ttl_seconds).ok_or_else(|| {
            error!(ttl_seconds, "access token ttl out of range");
            AppError::Internal
        })?;

        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: identity.id.to_string(),
            name: identity.display_name.clone(),
            actor: identity.actor,
            lid: login_id,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".to_string());
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign JWT");
            AppError::Internal
        })?;

        Ok(IssuedToken {
            token,
            claims,
            expires_at,
        })
    }

    /// Verify a presented token, separating "expired but authentic" from everything else.
    pub fn verify(&self, token: &str) -> Verification {
        match jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Verification::Valid(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                match jsonwebtoken::decode::<AccessClaims>(
                    token,
                    &self.decoding_key,
                    &self.expired_validation,
                ) {
                    Ok(data) => Verification::Expired(data.claims),
                    Err(e) => {
                        debug!(error = %e, "expired token failed secondary validation");
                        Verification::Invalid
                    }
                }
            }
            Err(e) => {
                debug!(error = %e, "access token rejected");
                Verification::Invalid
            }
        }
    }
}

/// `now + ttl_seconds`, or `None` when it does not fit a timestamp.
pub(crate) fn expiry(now: DateTime<Utc>, ttl_seconds: u64) -> Option<DateTime<Utc>> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(ChronoDuration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
}
