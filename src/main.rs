use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use paperdash::server::{self, AppState};
use paperdash::{snapshot, AppConfig, Error, SnapshotStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,paperdash=debug".into()),
        )
        .init();

    if let Err(err) = run().await {
        tracing::error!("fatal: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config_path =
        std::env::var("PAPERDASH_CONFIG").unwrap_or_else(|_| "paperdash.yaml".to_string());
    let config = Arc::new(AppConfig::load(&config_path)?);
    if config.users.is_empty() {
        tracing::warn!("no users configured, nothing to serve");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("paperdash/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    let store = Arc::new(SnapshotStore::new());

    // Populate every snapshot before accepting traffic so panels never
    // see a cold 503 after a restart longer than one poll interval.
    tracing::info!("running initial refresh");
    snapshot::refresh_all(&http, &config, &store).await;

    tokio::spawn(snapshot::run_refresh_loop(
        http,
        Arc::clone(&config),
        Arc::clone(&store),
    ));

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        store,
        render: config.render.clone(),
    });
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", err);
    }
}
