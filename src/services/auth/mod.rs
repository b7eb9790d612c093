/*
 * Responsibility
 * - access token の発行/検証 (jwt)
 * - session registry / refresh coordinator / login・logout
 */
pub mod jwt;
pub mod login;
pub mod refresh;
pub mod refresh_token;
pub mod session;

pub use jwt::{TokenIssuer, Verification};
pub use login::LoginService;
pub use refresh::RefreshCoordinator;
pub use refresh_token::RefreshTokenPolicy;
pub use session::SessionRegistry;
