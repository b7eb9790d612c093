/*
 * Responsibility
 * - 環境変数や設定の読み込み (DATABASE_URL, CORS 許可、token 署名鍵など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const MIN_SECRET_LEN: usize = 32;
// One year; token expiries are computed as now + ttl.
const MAX_TOKEN_TTL_SECONDS: u64 = 31_536_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    pub cors_allowed_origins: Vec<String>,

    pub auth_issuer: String,
    pub auth_audience: String,
    // HS256 signing secret for access tokens
    pub access_jwt_secret: String,
    // Token lifetimes (seconds)
    pub access_token_ttl_seconds: u64,
    pub access_token_leeway_seconds: u64,
    pub refresh_token_ttl_seconds: u64,

    pub store_timeout: Duration,
    pub request_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print secrets
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("database_max_connections", &self.database_max_connections)
            .field("auth_issuer", &self.auth_issuer)
            .field("auth_audience", &self.auth_audience)
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (env vars in production, maps in tests).
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&get, "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(&get("APP_ENV").unwrap_or_else(|| "development".to_string()));

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?;
        let run_migrations = parse_or(&get, "RUN_MIGRATIONS", false)?;

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let auth_issuer = get("AUTH_ISSUER").ok_or(ConfigError::Missing("AUTH_ISSUER"))?;
        let auth_audience = get("AUTH_AUDIENCE").ok_or(ConfigError::Missing("AUTH_AUDIENCE"))?;

        let access_jwt_secret =
            get("ACCESS_JWT_SECRET").ok_or(ConfigError::Missing("ACCESS_JWT_SECRET"))?;
        if access_jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid("ACCESS_JWT_SECRET"));
        }

        let access_token_ttl_seconds = parse_or(&get, "ACCESS_TOKEN_TTL_SECONDS", 600)?; // 10 min
        let access_token_leeway_seconds = parse_or(&get, "ACCESS_TOKEN_LEEWAY_SECONDS", 0)?;
        let refresh_token_ttl_seconds = parse_or(&get, "REFRESH_TOKEN_TTL_SECONDS", 2_592_000)?; // 30 days
        if access_token_ttl_seconds == 0 || access_token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::Invalid("ACCESS_TOKEN_TTL_SECONDS"));
        }
        if refresh_token_ttl_seconds <= access_token_ttl_seconds
            || refresh_token_ttl_seconds > MAX_TOKEN_TTL_SECONDS
        {
            return Err(ConfigError::Invalid("REFRESH_TOKEN_TTL_SECONDS"));
        }

        let store_timeout = Duration::from_millis(parse_or(&get, "STORE_TIMEOUT_MS", 2_000)?);
        let request_timeout = Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECONDS", 30)?);

        Ok(Self {
            addr,
            app_env,
            database_url,
            database_max_connections,
            run_migrations,
            cors_allowed_origins,
            auth_issuer,
            auth_audience,
            access_jwt_secret,
            access_token_ttl_seconds,
            access_token_leeway_seconds,
            refresh_token_ttl_seconds,
            store_timeout,
            request_timeout,
        })
    }
}

// Absent keys fall back to the default; present but unparsable keys are rejected.
fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
