pub mod error;
#[cfg(test)]
pub mod fixtures;
pub mod identity_repo;
#[cfg(test)]
pub mod memory;
pub mod privilege_repo;
pub mod record_repo;
pub mod refresh_token_repo;
pub mod session_repo;
