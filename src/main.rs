//! Realty Backend
//! Mission: Serve admin and client authentication, accounts and role permissions

use anyhow::{Context, Result};
use clap::Parser;
use realty_backend::{
    config::{load_env, parse_lifetime, resolve_data_path, AppConfig},
    middleware::RateLimitLayer,
    server::{build_router, login_rate_limit, AppState, API_PREFIX},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "realty")]
#[command(about = "Realty platform auth and accounts server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// Path to the SQLite auth database
    #[arg(long, env = "AUTH_DB_PATH")]
    db: Option<String>,

    /// Access token lifetime, e.g. `15m`
    #[arg(long, env = "ACCESS_TOKEN_LIFE")]
    token_life: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(db) = args.db {
        config.db_path = resolve_data_path(Some(db), "realty_auth.db");
    }
    if let Some(life) = args.token_life {
        config.access_token_life_secs = parse_lifetime(&life)
            .context("Invalid --token-life")?;
    }

    info!("🏠 Realty backend starting");

    let state = AppState::from_config(&config)?;
    info!("🔐 Auth database at: {}", config.db_path);
    info!(
        "⏱️ Access token lifetime: {}s",
        config.access_token_life_secs
    );

    let limiter = RateLimitLayer::new(login_rate_limit(&config));
    spawn_limiter_cleanup(limiter.clone());

    let app = build_router(state, limiter);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(
        "🎯 API server listening on {} (routes under {})",
        config.bind_addr, API_PREFIX
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn spawn_limiter_cleanup(limiter: RateLimitLayer) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(120));
        loop {
            ticker.tick().await;
            limiter.cleanup();
        }
    });
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realty_backend=debug,realty=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
