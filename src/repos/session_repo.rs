use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoResult;
use crate::repos::refresh_token_repo::{self, NewRefreshToken};

/// Device/browser descriptors captured when a request opens or refreshes a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: Option<String>,
    pub browser: Option<String>,
    pub client_addr: Option<String>,
}

/// An access token about to be persisted next to its session.
#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogin {
    pub login_id: Uuid,
    pub identity_id: i64,
    pub device: DeviceInfo,
    pub access: NewAccessToken,
    pub refresh: NewRefreshToken,
    pub now: DateTime<Utc>,
}

/// Inputs for rotating an expired access token.
#[derive(Debug, Clone)]
pub struct TokenRotation {
    pub identity_id: i64,
    pub login_id: Uuid,
    /// The expired token the client presented.
    pub presented_token: String,
    pub access: NewAccessToken,
    pub refresh_token_id: Uuid,
    pub device: Option<String>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The presented token was current; a new token and session replaced it.
    Rotated(SessionRow),
    /// A concurrent refresh already replaced the presented token; this is its session.
    Converged(SessionRow),
    /// The presented token is no longer the login's current token.
    Superseded,
}

/// Persistence of login records, sessions and access-token records.
///
/// Every mutating method is one transaction. Supersession of a login's session
/// happens under a row lock on the login record, backed by the unique partial
/// index `sessions_one_active_per_login`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Record a login and bind its first session: login record, fresh refresh
    /// token, access-token record, session, online flag. One transaction.
    async fn open_login(&self, login: NewLogin) -> RepoResult<SessionRow>;

    async fn active_session(&self, login_id: Uuid) -> RepoResult<Option<SessionRow>>;

    async fn rotate(&self, rotation: TokenRotation) -> RepoResult<RotationOutcome>;

    async fn close_login(
        &self,
        identity_id: i64,
        login_id: Uuid,
        now: DateTime<Utc>,
    ) -> RepoResult<()>;
}

#[derive(Clone, Debug)]
pub struct PgSessionRepo {
    pool: PgPool,
}

impl PgSessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionRepo {
    async fn open_login(&self, login: NewLogin) -> RepoResult<SessionRow> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO login_records (id, identity_id, device, browser, client_addr, created_at, active)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            "#,
        )
        .bind(login.login_id)
        .bind(login.identity_id)
        .bind(login.device.device.as_deref())
        .bind(login.device.browser.as_deref())
        .bind(login.device.client_addr.as_deref())
        .bind(login.now)
        .execute(&mut *tx)
        .await?;

        refresh_token_repo::deactivate_for_identity(&mut tx, login.identity_id).await?;
        refresh_token_repo::insert(&mut tx, &login.refresh, login.identity_id, login.now).await?;

        let retired = retire_access_tokens(&mut tx, login.identity_id, None).await?;
        insert_access_token(
            &mut tx,
            &login.access,
            login.identity_id,
            login.login_id,
            login.refresh.id,
        )
        .await?;
        link_replacement(&mut tx, &retired, login.access.id).await?;

        let session = supersede_session(
            &mut tx,
            login.login_id,
            &login.access.token,
            login.device.device.as_deref(),
            login.now,
        )
        .await?;
        set_online(&mut tx, login.identity_id, true).await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn active_session(&self, login_id: Uuid) -> RepoResult<Option<SessionRow>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, login_id, token, device, active, start_date, end_date
            FROM sessions
            WHERE login_id = $1 AND active
            "#,
        )
        .bind(login_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn rotate(&self, rotation: TokenRotation) -> RepoResult<RotationOutcome> {
        let mut tx = self.pool.begin().await?;

        // Serializes every refresh/login of this login record until commit.
        match lock_login(&mut tx, rotation.login_id).await? {
            Some(true) => {}
            _ => return Ok(RotationOutcome::Superseded),
        }

        let current = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, login_id, token, device, active, start_date, end_date
            FROM sessions
            WHERE login_id = $1 AND active
            "#,
        )
        .bind(rotation.login_id)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            Some(session) if session.token == rotation.presented_token => {
                let retired = retire_access_tokens(
                    &mut tx,
                    rotation.identity_id,
                    Some(&rotation.presented_token),
                )
                .await?;
                insert_access_token(
                    &mut tx,
                    &rotation.access,
                    rotation.identity_id,
                    rotation.login_id,
                    rotation.refresh_token_id,
                )
                .await?;
                link_replacement(&mut tx, &retired, rotation.access.id).await?;
                let session = supersede_session(
                    &mut tx,
                    rotation.login_id,
                    &rotation.access.token,
                    rotation.device.as_deref(),
                    rotation.now,
                )
                .await?;

                tx.commit().await?;
                Ok(RotationOutcome::Rotated(session))
            }
            Some(session) => {
                let replacement = sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT replacement.token
                    FROM access_tokens prior
                    JOIN access_tokens replacement ON replacement.id = prior.replaced_by
                    WHERE prior.token = $1
                        AND prior.login_id = $2
                    "#,
                )
                .bind(&rotation.presented_token)
                .bind(rotation.login_id)
                .fetch_optional(&mut *tx)
                .await?;

                tx.commit().await?;
                if replacement.as_deref() == Some(session.token.as_str()) {
                    Ok(RotationOutcome::Converged(session))
                } else {
                    Ok(RotationOutcome::Superseded)
                }
            }
            None => Ok(RotationOutcome::Superseded),
        }
    }

    async fn close_login(
        &self,
        identity_id: i64,
        login_id: Uuid,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        lock_login(&mut tx, login_id).await?;

        sqlx::query("UPDATE login_records SET active = FALSE WHERE id = $1")
            .bind(login_id)
            .execute(&mut *tx)
            .await?;
        end_sessions(&mut tx, login_id, now).await?;
        sqlx::query("UPDATE access_tokens SET active = FALSE WHERE identity_id = $1 AND active")
            .bind(identity_id)
            .execute(&mut *tx)
            .await?;
        refresh_token_repo::deactivate_for_identity(&mut tx, identity_id).await?;
        set_online(&mut tx, identity_id, false).await?;

        tx.commit().await?;
        Ok(())
    }
}

// Returns the login record's active flag, holding its row lock until the transaction ends.
async fn lock_login(conn: &mut PgConnection, login_id: Uuid) -> RepoResult<Option<bool>> {
    let active = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT active
        FROM login_records
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(login_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(active)
}

async fn end_sessions(conn: &mut PgConnection, login_id: Uuid, now: DateTime<Utc>) -> RepoResult<u64> {
    let done = sqlx::query(
        r#"
        UPDATE sessions
        SET active = FALSE,
            end_date = $2
        WHERE login_id = $1
            AND active
        "#,
    )
    .bind(login_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(done.rows_affected())
}

// Deactivate-previous + insert-new. Callers hold the login lock (or own a fresh login).
async fn supersede_session(
    conn: &mut PgConnection,
    login_id: Uuid,
    token: &str,
    device: Option<&str>,
    now: DateTime<Utc>,
) -> RepoResult<SessionRow> {
    end_sessions(conn, login_id, now).await?;

    let row = sqlx::query_as::<_, SessionRow>(
        r#"
        INSERT INTO sessions (id, login_id, token, device, active, start_date)
        VALUES ($1, $2, $3, $4, TRUE, $5)
        RETURNING id, login_id, token, device, active, start_date, end_date
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(login_id)
    .bind(token)
    .bind(device)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

// Deactivates the identity's active access token(s) and the presented one.
// `replaced_by` references a row inserted after this, so it is set by `link_replacement`.
async fn retire_access_tokens(
    conn: &mut PgConnection,
    identity_id: i64,
    presented: Option<&str>,
) -> RepoResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE access_tokens
        SET active = FALSE
        WHERE identity_id = $1
            AND (active OR token = $2)
        RETURNING id
        "#,
    )
    .bind(identity_id)
    .bind(presented)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

async fn link_replacement(
    conn: &mut PgConnection,
    retired: &[Uuid],
    replaced_by: Uuid,
) -> RepoResult<u64> {
    if retired.is_empty() {
        return Ok(0);
    }

    let done = sqlx::query(
        r#"
        UPDATE access_tokens
        SET replaced_by = $2
        WHERE id = ANY($1)
        "#,
    )
    .bind(retired)
    .bind(replaced_by)
    .execute(&mut *conn)
    .await?;

    Ok(done.rows_affected())
}

async fn insert_access_token(
    conn: &mut PgConnection,
    access: &NewAccessToken,
    identity_id: i64,
    login_id: Uuid,
    refresh_token_id: Uuid,
) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO access_tokens (id, token, identity_id, login_id, refresh_token_id, expires_at, active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        "#,
    )
    .bind(access.id)
    .bind(&access.token)
    .bind(identity_id)
    .bind(login_id)
    .bind(refresh_token_id)
    .bind(access.expires_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn set_online(conn: &mut PgConnection, identity_id: i64, online: bool) -> RepoResult<u64> {
    let done = sqlx::query("UPDATE identities SET online = $2 WHERE id = $1")
        .bind(identity_id)
        .bind(online)
        .execute(&mut *conn)
        .await?;

    Ok(done.rows_affected())
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub login_id: Uuid,
    pub token: String,
    pub device: Option<String>,
    pub active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}
