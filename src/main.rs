use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vigil::api::{create_app, PositionSource};
use vigil::config::{config_path, load_config};
use vigil::feed::{run_feed, FeedSession, SnapshotClient};
use vigil::layout::SqlitePositionStore;
use vigil::state::StateEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .init();

    info!("Vigil starting...");

    let path = config_path();
    let config = load_config(&path)?;
    info!(
        config = %path.display(),
        snapshot_url = %config.feed.snapshot_url,
        feed_url = %config.feed.feed_url,
        bind_addr = %config.api.bind_addr,
        unknown_entity_policy = ?config.feed.unknown_entity_policy,
        "Configuration loaded"
    );

    let engine = Arc::new(
        StateEngine::new(config.feed.unknown_entity_policy)
            .with_compaction_threshold(config.feed.compaction_threshold),
    );
    let session = Arc::new(FeedSession::new(Arc::clone(&engine)));

    // Layout positions are optional; the live view works without them
    let position_store = match SqlitePositionStore::new(&config.store.db_path) {
        Ok(store) => {
            info!(db = %config.store.db_path.display(), "Layout store opened");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(error = %e, db = %config.store.db_path.display(), "Layout store unavailable");
            None
        }
    };

    // Initial bulk snapshot; a failure is reported through load status
    let client = SnapshotClient::new(
        config.feed.snapshot_url.clone(),
        config.feed.history_url.clone(),
        Duration::from_secs(config.feed.request_timeout_seconds),
    )
    .context("Failed to build snapshot client")?;

    let (upstream_positions, upstream_metrics) = match client.fetch_snapshot().await {
        Ok(snapshot) => {
            let entities = engine.load_snapshot(snapshot.events);
            info!(
                entities = entities,
                upstream_positions = snapshot.positions.len(),
                upstream_metrics = snapshot.metrics.is_some(),
                "Initial snapshot applied"
            );
            (snapshot.positions, snapshot.metrics)
        }
        Err(e) => {
            engine.set_load_error(e.to_string());
            (Vec::new(), None)
        }
    };

    // Push channel
    let feed_session = Arc::clone(&session);
    let feed_url = config.feed.feed_url.clone();
    let reconnect_delay = config.feed.reconnect_delay_seconds;
    let feed_handle = tokio::spawn(async move {
        loop {
            run_feed(&feed_session, &feed_url).await;
            if reconnect_delay == 0 {
                warn!("Push channel closed; reconnect disabled");
                break;
            }
            info!(delay_seconds = reconnect_delay, "Reconnecting push channel");
            tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        }
    });

    // HTTP/WebSocket API
    let positions = PositionSource::new(position_store, upstream_positions);
    let app = create_app(session, positions, upstream_metrics, &config.api);
    let listener = tokio::net::TcpListener::bind(config.api.bind_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    feed_handle.abort();
    info!("Vigil stopped");

    Ok(())
}
