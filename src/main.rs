//! QuizSync — Binary Entrypoint
//! Boots the Axum HTTP trigger surface around the sync driver.
//!
//! The chat-network session transport is provided by an external client
//! library; embedders wire it in through `sources::ChatSource` when building
//! their own driver. Out of the box this binary runs the feed-scraper source
//! (when configured) behind `POST /sync`.

use std::sync::Arc;

use quizsync::api::{create_router, AppState};
use quizsync::config::SyncConfig;
use quizsync::driver::SyncDriver;
use quizsync::extractor::OpenAiExtractor;
use quizsync::metrics::Metrics;
use quizsync::sources::{CommandFeedScraper, FeedSource};
use quizsync::store::{EventStore, JsonFileStore};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quizsync=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = SyncConfig::load()?;
    let metrics = Metrics::init();

    let store: Arc<dyn EventStore> = Arc::new(JsonFileStore::new(&config.data_dir)?);
    let extractor = Arc::new(OpenAiExtractor::new(None));

    let mut driver = SyncDriver::new(config.clone(), store.clone(), extractor);
    if let Some(command) = config.scraper_command.clone() {
        let cfg = config.clone();
        driver = driver.with_source(Box::new(move || {
            Box::new(FeedSource::new(
                Box::new(CommandFeedScraper::new(command.clone())),
                &cfg,
            ))
        }));
        tracing::info!(pages = config.feed_pages.len(), "feed source enabled");
    } else {
        tracing::info!("no scraper_command configured; feed source disabled");
    }
    if !config.channels.is_empty() {
        tracing::info!(
            channels = config.channels.len(),
            "chat channels configured; wire a session client via the library to sync them"
        );
    }

    let state = AppState {
        driver: Arc::new(driver),
        store,
    };
    let router = create_router(state).merge(metrics.router());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
