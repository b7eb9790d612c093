/**
 * Responsibility
 * - repo が上位に伝える意味の定義
 * - transient (一度だけ retry してよい) かどうかの判定
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[source] sqlx::Error),
    // A uniqueness constraint rejected a write (e.g. a second active session for a login).
    #[error("conflict")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("missing {0}")]
    Missing(&'static str),
}

impl RepoError {
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(dbe) = &e
            && dbe.code().as_deref() == Some("23505")
        {
            return RepoError::Conflict;
        }
        if let sqlx::Error::PoolClosed = e {
            return RepoError::Unavailable("pool closed".to_string());
        }
        RepoError::Db(e)
    }

    /// Errors worth a single retry within the request budget.
    pub fn is_transient(&self) -> bool {
        match self {
            RepoError::Db(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Protocol(_)
            ),
            RepoError::Conflict | RepoError::Unavailable(_) => true,
            RepoError::Missing(_) => false,
        }
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        RepoError::from_sqlx(e)
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
