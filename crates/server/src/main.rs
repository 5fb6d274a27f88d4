use std::sync::Arc;

use anyhow::Context;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use hearth_categorize::{Detector, HttpClassifier, Pipeline};

mod auth;
mod config;
mod error;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new("hearth-server".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = config::Config::from_env()?;

    let pool = hearth_storage::create_db(&config.db_path)
        .await
        .context("failed to open database")?;
    hearth_storage::seed_default_categories(&pool)
        .await
        .context("failed to seed default categories")?;

    let classifier = HttpClassifier::new(config.ai.clone())
        .context("failed to build the classification client")?;
    if config.ai.is_none() {
        tracing::warn!("no AI classifier configured; transactions the other stages miss will stay unmatched");
    }

    let state = Arc::new(routes::AppState {
        store: hearth_storage::SqliteStore::new(pool),
        pipeline: Pipeline::new(classifier, config.pipeline.clone()),
        detector: Detector::new(config.detector.clone()),
        api_token_sha256: config.api_token_sha256.clone(),
        run_guard: tokio::sync::Mutex::new(()),
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listen address")?;
    tracing::info!("listening on {}", config.listen_addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
