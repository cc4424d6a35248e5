//! Medscribe ingestion service - main entry point

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medscribe::config::Config;
use medscribe::upload::reaper::{self, ReaperConfig};
use medscribe::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medscribe=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::load());

    for dir in [config.chunks_dir(), config.audio_dir(), config.tmp_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
    }

    let db = medscribe::db::init_database_pool(&config.database_path())
        .await
        .context("Failed to initialize database")?;

    let state = AppState::new(config.clone(), db);

    reaper::spawn(
        state.sessions.clone(),
        state.dedup.clone(),
        ReaperConfig {
            period: config.reaper_period,
            session_ttl: config.session_ttl,
            dedup_window: config.dedup_window,
        },
    );

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Medscribe listening on {}", config.bind_address);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;

    Ok(())
}
