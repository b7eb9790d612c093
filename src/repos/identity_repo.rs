/*
 * Responsibility
 * - identities テーブル向け SQLx 操作 (read-only)
 * - online フラグの更新は login/logout の transaction 内 (session_repo) で行う
 */
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::repos::error::RepoResult;

/// Actor population an identity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Admin,
    Seller,
    Buyer,
}

#[derive(Debug, Error)]
#[error("unknown actor kind '{0}'")]
pub struct UnknownActor(String);

impl TryFrom<String> for ActorKind {
    type Error = UnknownActor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "admin" => Ok(ActorKind::Admin),
            "seller" => Ok(ActorKind::Seller),
            "buyer" => Ok(ActorKind::Buyer),
            _ => Err(UnknownActor(value)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct IdentityRow {
    pub id: i64,
    pub display_name: String,
    #[sqlx(try_from = "String")]
    pub actor: ActorKind,
    pub role_id: i64,
    pub online: bool,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub password_hash: String,
    pub active: bool,
}

/// Read access to provisioned identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_identity(&self, id: i64) -> RepoResult<Option<IdentityRow>>;

    async fn find_credentials(&self, username: &str) -> RepoResult<Option<CredentialRow>>;
}

#[derive(Clone, Debug)]
pub struct PgIdentityRepo {
    pool: PgPool,
}

impl PgIdentityRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityRepo {
    async fn find_identity(&self, id: i64) -> RepoResult<Option<IdentityRow>> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, display_name, actor, role_id, online, active
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_credentials(&self, username: &str) -> RepoResult<Option<CredentialRow>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, password_hash, active
            FROM identities
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
