//! In-memory stores for tests.
//!
//! One mutex guards every table, so each trait method is atomic in the same
//! way the Postgres transactions are. Counters expose how many writes and
//! privilege lookups were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::error::RepoResult;
use crate::repos::identity_repo::{CredentialRow, IdentityRow, IdentityStore};
use crate::repos::privilege_repo::{ModuleRow, PrivilegeRow, PrivilegeStore};
use crate::repos::refresh_token_repo::{RefreshTokenRow, RefreshTokenStore};
use crate::repos::session_repo::{
    NewAccessToken, NewLogin, RotationOutcome, SessionRow, SessionStore, TokenRotation,
};
use crate::services::authz::Action;
use crate::services::handoff::{EntityGateway, Handoff};

struct StoredIdentity {
    row: IdentityRow,
    username: String,
    password_hash: String,
}

struct LoginRecord {
    identity_id: i64,
    active: bool,
}

struct AccessTokenRecord {
    id: Uuid,
    token: String,
    identity_id: i64,
    login_id: Uuid,
    active: bool,
    replaced_by: Option<Uuid>,
}

struct Record {
    module: String,
    owner_id: i64,
    row: Value,
}

#[derive(Default)]
struct Tables {
    identities: HashMap<i64, StoredIdentity>,
    logins: HashMap<Uuid, LoginRecord>,
    sessions: Vec<SessionRow>,
    access_tokens: Vec<AccessTokenRecord>,
    refresh_tokens: Vec<RefreshTokenRow>,
    modules: Vec<ModuleRow>,
    // Keyed by (role, module); the role → profile hop is collapsed.
    privileges: HashMap<(i64, i64), PrivilegeRow>,
    data_access: HashMap<(i64, i64), String>,
    records: Vec<Record>,
}

impl Tables {
    fn supersede_session(
        &mut self,
        login_id: Uuid,
        token: &str,
        device: Option<&str>,
        now: DateTime<Utc>,
    ) -> SessionRow {
        for session in self
            .sessions
            .iter_mut()
            .filter(|s| s.login_id == login_id && s.active)
        {
            session.active = false;
            session.end_date = Some(now);
        }

        let session = SessionRow {
            id: Uuid::new_v4(),
            login_id,
            token: token.to_string(),
            device: device.map(str::to_string),
            active: true,
            start_date: now,
            end_date: None,
        };
        self.sessions.push(session.clone());
        session
    }

    fn replace_access_tokens(&mut self, identity_id: i64, presented: Option<&str>, replaced_by: Uuid) {
        for record in self.access_tokens.iter_mut().filter(|r| {
            r.identity_id == identity_id && (r.active || Some(r.token.as_str()) == presented)
        }) {
            record.active = false;
            record.replaced_by = Some(replaced_by);
        }
    }

    fn insert_access_token(&mut self, access: &NewAccessToken, identity_id: i64, login_id: Uuid) {
        self.access_tokens.push(AccessTokenRecord {
            id: access.id,
            token: access.token.clone(),
            identity_id,
            login_id,
            active: true,
            replaced_by: None,
        });
    }

    fn active_session(&self, login_id: Uuid) -> Option<&SessionRow> {
        self.sessions
            .iter()
            .find(|s| s.login_id == login_id && s.active)
    }

    fn set_online(&mut self, identity_id: i64, online: bool) {
        if let Some(identity) = self.identities.get_mut(&identity_id) {
            identity.row.online = online;
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    mutations: AtomicUsize,
    privilege_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn privilege_lookups(&self) -> usize {
        self.privilege_lookups.load(Ordering::SeqCst)
    }

    pub fn add_identity(&self, row: IdentityRow, username: &str, password_hash: &str) {
        self.tables().identities.insert(
            row.id,
            StoredIdentity {
                row,
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
    }

    pub fn set_online(&self, identity_id: i64, online: bool) {
        self.tables().set_online(identity_id, online);
    }

    pub fn is_online(&self, identity_id: i64) -> bool {
        self.tables()
            .identities
            .get(&identity_id)
            .is_some_and(|i| i.row.online)
    }

    pub fn deactivate_identity(&self, identity_id: i64) {
        if let Some(identity) = self.tables().identities.get_mut(&identity_id) {
            identity.row.active = false;
        }
    }

    /// An open login whose current session and access-token record hold `token`.
    pub fn seed_login(
        &self,
        identity_id: i64,
        login_id: Uuid,
        token: &str,
        refresh_expires_at: DateTime<Utc>,
    ) {
        let now = Utc::now();
        let mut tables = self.tables();

        tables.logins.insert(
            login_id,
            LoginRecord {
                identity_id,
                active: true,
            },
        );
        tables.refresh_tokens.push(RefreshTokenRow {
            id: Uuid::new_v4(),
            identity_id,
            token_hash: vec![0; 32],
            issued_at: now,
            expires_at: refresh_expires_at,
            active: true,
        });
        let access = NewAccessToken {
            id: Uuid::new_v4(),
            token: token.to_string(),
            expires_at: now,
        };
        tables.insert_access_token(&access, identity_id, login_id);
        tables.supersede_session(login_id, token, None, now);
        tables.set_online(identity_id, true);
    }

    /// Rotate `from` to `to` as if another request had refreshed it.
    pub fn force_rotate(&self, login_id: Uuid, from: &str, to: &str) {
        let mut tables = self.tables();
        let Some(identity_id) = tables.logins.get(&login_id).map(|l| l.identity_id) else {
            return;
        };
        let access = NewAccessToken {
            id: Uuid::new_v4(),
            token: to.to_string(),
            expires_at: Utc::now(),
        };

        tables.replace_access_tokens(identity_id, Some(from), access.id);
        tables.insert_access_token(&access, identity_id, login_id);
        tables.supersede_session(login_id, to, None, Utc::now());
    }

    pub fn expire_refresh_tokens(&self, identity_id: i64, at: DateTime<Utc>) {
        for row in self
            .tables()
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.identity_id == identity_id && r.active)
        {
            row.expires_at = at;
        }
    }

    pub fn revoke_refresh_tokens(&self, identity_id: i64) {
        for row in self
            .tables()
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.identity_id == identity_id)
        {
            row.active = false;
        }
    }

    pub fn sessions_of(&self, login_id: Uuid) -> Vec<SessionRow> {
        self.tables()
            .sessions
            .iter()
            .filter(|s| s.login_id == login_id)
            .cloned()
            .collect()
    }

    pub fn access_token_active(&self, token: &str) -> bool {
        self.tables()
            .access_tokens
            .iter()
            .any(|r| r.token == token && r.active)
    }

    pub fn add_module(&self, module: ModuleRow) {
        self.tables().modules.push(module);
    }

    pub fn modules(&self) -> Vec<ModuleRow> {
        self.tables().modules.clone()
    }

    pub fn grant(&self, role_id: i64, module_id: i64, row: PrivilegeRow) {
        self.tables().privileges.insert((role_id, module_id), row);
    }

    pub fn set_data_access(&self, role_id: i64, module_id: i64, value: &str) {
        self.tables()
            .data_access
            .insert((role_id, module_id), value.to_string());
    }

    /// `row` must carry `id` and `created_by`.
    pub fn add_record(&self, module: &str, row: Value) {
        let owner_id = row["created_by"].as_i64().unwrap_or_default();
        self.tables().records.push(Record {
            module: module.to_string(),
            owner_id,
            row,
        });
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_identity(&self, id: i64) -> RepoResult<Option<IdentityRow>> {
        Ok(self.tables().identities.get(&id).map(|i| i.row.clone()))
    }

    async fn find_credentials(&self, username: &str) -> RepoResult<Option<CredentialRow>> {
        Ok(self
            .tables()
            .identities
            .values()
            .find(|i| i.username == username)
            .map(|i| CredentialRow {
                id: i.row.id,
                password_hash: i.password_hash.clone(),
                active: i.row.active,
            }))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn latest_active(&self, identity_id: i64) -> RepoResult<Option<RefreshTokenRow>> {
        Ok(self
            .tables()
            .refresh_tokens
            .iter()
            .filter(|r| r.identity_id == identity_id && r.active)
            .max_by_key(|r| r.issued_at)
            .cloned())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn open_login(&self, login: NewLogin) -> RepoResult<SessionRow> {
        let mut tables = self.tables();

        tables.logins.insert(
            login.login_id,
            LoginRecord {
                identity_id: login.identity_id,
                active: true,
            },
        );
        for row in tables
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.identity_id == login.identity_id)
        {
            row.active = false;
        }
        tables.refresh_tokens.push(RefreshTokenRow {
            id: login.refresh.id,
            identity_id: login.identity_id,
            token_hash: login.refresh.token_hash.clone(),
            issued_at: login.now,
            expires_at: login.refresh.expires_at,
            active: true,
        });
        tables.replace_access_tokens(login.identity_id, None, login.access.id);
        tables.insert_access_token(&login.access, login.identity_id, login.login_id);
        let session = tables.supersede_session(
            login.login_id,
            &login.access.token,
            login.device.device.as_deref(),
            login.now,
        );
        tables.set_online(login.identity_id, true);

        self.mutated();
        Ok(session)
    }

    async fn active_session(&self, login_id: Uuid) -> RepoResult<Option<SessionRow>> {
        Ok(self.tables().active_session(login_id).cloned())
    }

    async fn rotate(&self, rotation: TokenRotation) -> RepoResult<RotationOutcome> {
        let mut tables = self.tables();

        if !tables
            .logins
            .get(&rotation.login_id)
            .is_some_and(|l| l.active)
        {
            return Ok(RotationOutcome::Superseded);
        }
        let Some(current) = tables.active_session(rotation.login_id).cloned() else {
            return Ok(RotationOutcome::Superseded);
        };

        if current.token == rotation.presented_token {
            tables.replace_access_tokens(
                rotation.identity_id,
                Some(&rotation.presented_token),
                rotation.access.id,
            );
            tables.insert_access_token(&rotation.access, rotation.identity_id, rotation.login_id);
            let session = tables.supersede_session(
                rotation.login_id,
                &rotation.access.token,
                rotation.device.as_deref(),
                rotation.now,
            );

            self.mutated();
            return Ok(RotationOutcome::Rotated(session));
        }

        let replacement = tables
            .access_tokens
            .iter()
            .find(|r| r.token == rotation.presented_token && r.login_id == rotation.login_id)
            .and_then(|r| r.replaced_by)
            .and_then(|id| tables.access_tokens.iter().find(|r| r.id == id))
            .map(|r| r.token.as_str());

        if replacement == Some(current.token.as_str()) {
            Ok(RotationOutcome::Converged(current))
        } else {
            Ok(RotationOutcome::Superseded)
        }
    }

    async fn close_login(
        &self,
        identity_id: i64,
        login_id: Uuid,
        now: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut tables = self.tables();

        if let Some(login) = tables.logins.get_mut(&login_id) {
            login.active = false;
        }
        for session in tables
            .sessions
            .iter_mut()
            .filter(|s| s.login_id == login_id && s.active)
        {
            session.active = false;
            session.end_date = Some(now);
        }
        for record in tables
            .access_tokens
            .iter_mut()
            .filter(|r| r.identity_id == identity_id)
        {
            record.active = false;
        }
        for row in tables
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.identity_id == identity_id)
        {
            row.active = false;
        }
        tables.set_online(identity_id, false);

        self.mutated();
        Ok(())
    }
}

#[async_trait]
impl PrivilegeStore for MemoryStore {
    async fn active_modules(&self) -> RepoResult<Vec<ModuleRow>> {
        Ok(self
            .tables()
            .modules
            .iter()
            .filter(|m| m.active)
            .cloned()
            .collect())
    }

    async fn profile_privilege(
        &self,
        role_id: i64,
        module_id: i64,
    ) -> RepoResult<Option<PrivilegeRow>> {
        self.privilege_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tables().privileges.get(&(role_id, module_id)).cloned())
    }

    async fn role_data_access(&self, role_id: i64, module_id: i64) -> RepoResult<Option<String>> {
        Ok(self.tables().data_access.get(&(role_id, module_id)).cloned())
    }
}

#[async_trait]
impl EntityGateway for MemoryStore {
    async fn handle(&self, handoff: Handoff) -> Result<Value, AppError> {
        let tables = self.tables();
        let visible = |r: &&Record| {
            r.module == handoff.module
                && handoff.scope.is_none_or(|scope| scope.permits(r.owner_id))
        };

        match (handoff.action, handoff.record_id.as_deref()) {
            (Some(Action::List), _) => {
                let items: Vec<Value> = tables
                    .records
                    .iter()
                    .filter(visible)
                    .skip(handoff.page.offset() as usize)
                    .take(handoff.page.limit() as usize)
                    .map(|r| r.row.clone())
                    .collect();
                Ok(json!({
                    "items": items,
                    "page": handoff.page.page.max(1),
                    "per_page": handoff.page.limit(),
                    "scope": handoff.scope,
                }))
            }
            (Some(Action::View), Some(id)) => tables
                .records
                .iter()
                .filter(visible)
                .find(|r| r.row["id"].to_string() == id)
                .map(|r| r.row.clone())
                .ok_or(AppError::not_found("record")),
            _ => Err(AppError::NotImplemented),
        }
    }
}
