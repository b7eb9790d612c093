//! Seed rows for the Postgres-backed repo tests.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::refresh_token_repo::NewRefreshToken;
use crate::repos::session_repo::{DeviceInfo, NewAccessToken, NewLogin, TokenRotation};

pub const ROLE_ID: i64 = 1;

/// Profile + role `ROLE_ID` + an offline seller identity.
pub async fn seed_identity(pool: &PgPool, id: i64) {
    sqlx::query("INSERT INTO profiles (id, name) VALUES (1, 'sellers') ON CONFLICT DO NOTHING")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO roles (id, name, profile_id) VALUES ($1, 'seller', 1) ON CONFLICT DO NOTHING")
        .bind(ROLE_ID)
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        r#"
        INSERT INTO identities (id, username, display_name, actor, role_id, password_hash)
        VALUES ($1, $2, $3, 'seller', $4, 'unused')
        "#,
    )
    .bind(id)
    .bind(format!("seller{id}"))
    .bind(format!("Seller {id}"))
    .bind(ROLE_ID)
    .execute(pool)
    .await
    .unwrap();
}

pub fn new_login(identity_id: i64, token: &str) -> NewLogin {
    let now = Utc::now();
    NewLogin {
        login_id: Uuid::new_v4(),
        identity_id,
        device: DeviceInfo {
            device: Some("laptop".to_string()),
            ..DeviceInfo::default()
        },
        access: access(token),
        refresh: NewRefreshToken {
            id: Uuid::new_v4(),
            token_hash: Uuid::new_v4().as_bytes().to_vec(),
            expires_at: now + ChronoDuration::days(30),
        },
        now,
    }
}

pub fn access(token: &str) -> NewAccessToken {
    NewAccessToken {
        id: Uuid::new_v4(),
        token: token.to_string(),
        expires_at: Utc::now() + ChronoDuration::minutes(10),
    }
}

pub fn rotation(login: &NewLogin, presented: &str, next: &str) -> TokenRotation {
    TokenRotation {
        identity_id: login.identity_id,
        login_id: login.login_id,
        presented_token: presented.to_string(),
        access: access(next),
        refresh_token_id: login.refresh.id,
        device: Some("laptop".to_string()),
        now: Utc::now(),
    }
}
