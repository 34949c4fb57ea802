use std::sync::Arc;

use anyhow::Context;
use server::config::AppConfig;
use server::database::init_db;
use server::seed::{ensure_indexes, seed_bootstrap_admin};
use server::services::notify::consume_notifications;
use server::services::{DbAccountProvider, LogNotifier, NotificationBus};
use server::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    ensure_indexes(&db)
        .await
        .context("Failed to create indexes")?;
    seed_bootstrap_admin(&db, &config.bootstrap)
        .await
        .context("Failed to seed administrator")?;

    let (notifications, rx) = NotificationBus::new();
    tokio::spawn(consume_notifications(rx, Arc::new(LogNotifier)));

    let accounts = Arc::new(DbAccountProvider::new(
        db.clone(),
        notifications.clone(),
        config.auth.password_reset_ttl_minutes,
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState {
        db,
        config,
        accounts,
        notifications,
    };
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Server running at http://{}", addr);
    info!("API docs at http://{}/scalar", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
