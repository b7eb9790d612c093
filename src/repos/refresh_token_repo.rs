use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoResult;

/// DB access for refresh token persistence.
///
/// Notes:
/// - We store only a hash of the refresh token (opaque token design).
/// - Refresh tokens are never presented by clients; the gate looks up the latest
///   active one for an identity when an access token expires.
/// - Writes happen inside the login/logout transactions owned by `session_repo`,
///   so the helpers below take a connection instead of the pool.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Latest active refresh token for the identity, expired or not.
    async fn latest_active(&self, identity_id: i64) -> RepoResult<Option<RefreshTokenRow>>;
}

#[derive(Clone, Debug)]
pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenRepo {
    async fn latest_active(&self, identity_id: i64) -> RepoResult<Option<RefreshTokenRow>> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT
                id,
                identity_id,
                token_hash,
                issued_at,
                expires_at,
                active
            FROM refresh_tokens
            WHERE identity_id = $1
                AND active
            ORDER BY issued_at DESC
            LIMIT 1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Insert a newly issued refresh token.
pub(crate) async fn insert(
    conn: &mut PgConnection,
    token: &NewRefreshToken,
    identity_id: i64,
    issued_at: DateTime<Utc>,
) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, identity_id, token_hash, issued_at, expires_at, active)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        "#,
    )
    .bind(token.id)
    .bind(identity_id)
    .bind(&token.token_hash)
    .bind(issued_at)
    .bind(token.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Deactivate every active refresh token of an identity.
pub(crate) async fn deactivate_for_identity(
    conn: &mut PgConnection,
    identity_id: i64,
) -> RepoResult<u64> {
    let done = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET active = FALSE
        WHERE identity_id = $1
            AND active
        "#,
    )
    .bind(identity_id)
    .execute(&mut *conn)
    .await?;

    Ok(done.rows_affected())
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub token_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRow {
    pub id: Uuid,
    pub identity_id: i64,
    pub token_hash: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}
