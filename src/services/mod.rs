pub mod auth;
pub mod authz;
pub mod gate;
pub mod handoff;
pub mod store_guard;
