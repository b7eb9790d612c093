pub mod access;
pub mod carrier;

/// Request carrier for the access token, and the response header a refreshed token comes back in.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";
