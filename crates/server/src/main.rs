use anyhow::{Context, Error as AnyhowError};
use db::DBService;
use server::{AppState, file_logging, routes};
use services::services::{
    config::{ConfigError, load_config_from_file},
    webhooks::DeliveryWorker,
    wiki_cleanup::{WikiCleanupConfig, spawn_wiki_cleanup_service},
};
use sqlx::Error as SqlxError;
use thiserror::Error;
use utils::assets::config_path;

#[derive(Debug, Error)]
pub enum OrbitError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlx(#[from] SqlxError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[tokio::main]
async fn main() -> Result<(), OrbitError> {
    dotenvy::dotenv().ok();

    // Held until exit so buffered file logs are flushed.
    let _file_log_guard = file_logging::init_logging("info");

    tracing::info!(
        commit = option_env!("ORBIT_GIT_COMMIT").unwrap_or("unknown"),
        built_at = option_env!("ORBIT_BUILD_TIMESTAMP").unwrap_or("unknown"),
        "Starting orbit-server"
    );

    let mut config = load_config_from_file(&config_path()).await;
    config.apply_env_overrides();
    config.validate()?;

    let db = DBService::new().await?;

    let worker = DeliveryWorker::from_config(db.pool.clone(), &config.webhooks)
        .context("Failed to build webhook HTTP client")?
        .spawn();

    let wiki_cleanup = WikiCleanupConfig::from_wiki_config(&config.wiki)
        .map(|cleanup| spawn_wiki_cleanup_service(db.pool.clone(), cleanup));
    if wiki_cleanup.is_none() {
        tracing::debug!("Wiki revision retention not configured, cleanup disabled");
    }

    let host = config.server.host.clone();
    let port = config.server.port;
    let state = AppState::new(db.clone(), config);
    let app_router = routes::router(state);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();
    tracing::info!("Server running on http://{host}:{actual_port}");

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.abort();
    if let Some(handle) = wiki_cleanup {
        handle.abort();
    }
    perform_cleanup_actions(&db).await;

    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

/// Flush the WAL into the main database file and close the pool.
pub async fn perform_cleanup_actions(db: &DBService) {
    tracing::info!("Running final WAL checkpoint...");
    match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(&db.pool)
        .await
    {
        Ok(_) => tracing::info!("Final WAL checkpoint completed"),
        Err(e) => tracing::warn!("Final WAL checkpoint failed (data may still be in WAL): {}", e),
    }

    tracing::info!("Closing database connection pool...");
    db.pool.close().await;
    tracing::info!("Database connection pool closed");
}
