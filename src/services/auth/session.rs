use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::repos::session_repo::{NewLogin, SessionRow, SessionStore};
use crate::services::store_guard::StoreGuard;

/// The single canonical active session per login record.
///
/// Mutation goes through the store's transactional methods; this type adds the
/// "presented token must be the bound token" rule on lookup.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    guard: StoreGuard,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn SessionStore>, guard: StoreGuard) -> Self {
        Self { store, guard }
    }

    /// Open `login` and bind its access token to the login's one active session.
    ///
    /// The login record, its token records and the session commit together, so an
    /// aborted call leaves no login without a session.
    pub async fn create_session(&self, login: &NewLogin) -> Result<SessionRow, AppError> {
        self.guard
            .run("open_login", || self.store.open_login(login.clone()))
            .await
    }

    /// The active session of `login_id`, provided it is bound to `token`.
    ///
    /// A token that still verifies but is not the bound one has been superseded by a
    /// later login or refresh, and is rejected as expired.
    pub async fn find_active_session(
        &self,
        login_id: Uuid,
        token: &str,
    ) -> Result<SessionRow, AppError> {
        let session = self
            .guard
            .run("active_session", || self.store.active_session(login_id))
            .await?;

        match session {
            Some(session) if session.token == token => Ok(session),
            Some(session) => {
                debug!(login_id = %login_id, session_id = %session.id, "token superseded by a newer session");
                Err(AppError::TokenExpired)
            }
            None => {
                debug!(login_id = %login_id, "no active session for login");
                Err(AppError::TokenExpired)
            }
        }
    }
}
