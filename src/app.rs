/*
 * Responsibility
 * - Config読み込み → DB pool / migration → module registry → 依存生成 → Router 組み立て
 * - Middleware の適用 (http / CORS / security headers、gate は route 単位)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::Config;
use crate::middleware::{cors, http, security_headers};
use crate::repos::{
    identity_repo::PgIdentityRepo, privilege_repo::PgPrivilegeRepo, privilege_repo::PrivilegeStore,
    record_repo::PgRecordRepo, refresh_token_repo::PgRefreshTokenRepo, session_repo::PgSessionRepo,
};
use crate::services::auth::{RefreshTokenPolicy, TokenIssuer};
use crate::services::authz::{ModuleRegistry, RouteTable};
use crate::services::store_guard::StoreGuard;
use crate::state::{AppState, Stores};

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,access_gate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process. Production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting access gate in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("migrations applied");
    }

    let table = RouteTable::standard()?;
    let state = build_state(&config, pool).await?;
    let app = build_router(state, &table, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn store_guard(config: &Config) -> StoreGuard {
    // One retry fits inside twice the per-call timeout.
    StoreGuard::new(config.store_timeout, config.store_timeout * 2)
}

async fn build_state(config: &Config, pool: sqlx::PgPool) -> Result<AppState> {
    let guard = store_guard(config);
    let issuer = Arc::new(TokenIssuer::new(
        config.access_jwt_secret.as_bytes(),
        config.auth_issuer.clone(),
        config.auth_audience.clone(),
        config.access_token_ttl_seconds,
        config.access_token_leeway_seconds,
    ));

    let privileges = Arc::new(PgPrivilegeRepo::new(pool.clone()));
    let rows = guard
        .run("active_modules", || privileges.active_modules())
        .await
        .map_err(|e| anyhow::anyhow!("failed to load modules: {e}"))?;
    let modules = ModuleRegistry::new(rows)?;
    tracing::info!(modules = modules.len(), "module registry loaded");

    let stores = Stores {
        identities: Arc::new(PgIdentityRepo::new(pool.clone())),
        sessions: Arc::new(PgSessionRepo::new(pool.clone())),
        refresh_tokens: Arc::new(PgRefreshTokenRepo::new(pool.clone())),
        privileges,
        entities: Arc::new(PgRecordRepo::new(pool, guard)),
    };

    Ok(AppState::new(
        stores,
        issuer,
        RefreshTokenPolicy::new(config.refresh_token_ttl_seconds),
        modules,
        guard,
    ))
}

pub fn build_router(state: AppState, table: &RouteTable, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::v1::routes(state.clone(), table))
        .with_state(state);

    let router = security_headers::apply(router);
    let router = cors::apply(router, config);
    http::apply(router, config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
