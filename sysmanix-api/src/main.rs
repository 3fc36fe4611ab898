mod app;
mod config;

use anyhow::Context;
use app::{app_router, AppState, RateLimiter, RouterOptions};
use chrono::Utc;
use config::{ApiConfig, LogFormat};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::System;
use sysmanix_core::auth::{CredentialStore, TokenManager};
use sysmanix_core::services::{detect, NativeRunner, PollConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 优先读取 .env（若存在）
    let _ = dotenv();
    init_tracing(LogFormat::from_env());
    let config = ApiConfig::from_env()?;
    info!(log_format = ?config.log_format, "starting API on {}", config.bind);

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("create data dir {}", config.data_dir.display()))?;

    let credentials = Arc::new(CredentialStore::load(&config.users_file).await?);
    if credentials.is_empty() {
        tracing::warn!(path = %config.users_file.display(), "credential file has no users; nobody can log in");
    }

    let tokens = Arc::new(
        TokenManager::new(config.jwt_secret.clone())
            .with_issuer(config.jwt_issuer.clone())
            .with_ttl(config.token_ttl)?
            .open(&config.tokens_file)?,
    );
    let sweeper = tokens.clone().spawn_sweeper(config.sweep_interval);

    let backend = detect(
        Arc::new(NativeRunner),
        PollConfig {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        },
    )?;

    let state = AppState {
        tokens: tokens.clone(),
        credentials,
        backend,
        login_limiter: Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
        trust_proxy: config.trust_proxy,
        started_at: Utc::now(),
        system: Arc::new(Mutex::new(System::new())),
    };

    let app = app_router(
        state,
        RouterOptions {
            cors_origins: config.cors_origins.clone(),
            request_timeout: config.request_timeout,
        },
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    if let Err(e) = tokens.flush() {
        tracing::error!(error = %e, "failed to flush token store on shutdown");
    }
    info!("API stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
