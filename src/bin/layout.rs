use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tracing::info;
use vigil::config::{config_path, load_config};
use vigil::layout::{run_layout_job, Catalog, SqlitePositionStore};

/// Offline layout generation: catalog in, persisted positions out.
///
/// Exits non-zero when any batch failed to persist; the batches that did
/// succeed stay written.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .init();

    let config = load_config(&config_path())?;

    // Optional positional argument overrides the configured catalog
    let catalog_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.layout.catalog_path.clone());

    let catalog = Catalog::load(&catalog_path)?;
    info!(
        catalog = %catalog_path.display(),
        version = %catalog.version,
        entities = catalog.len(),
        "Catalog loaded"
    );

    let db_path = &config.store.db_path;
    let store = SqlitePositionStore::new(db_path)
        .with_context(|| format!("Failed to open layout store {}", db_path.display()))?;

    let now = Utc::now();
    let purged = store.purge_expired(now)?;
    if purged > 0 {
        info!(purged = purged, "Removed expired layout records");
    }

    let report = run_layout_job(
        &catalog,
        &store,
        config.layout.batch_size,
        Duration::days(config.layout.ttl_days),
        now,
    )?;

    if !report.is_complete() {
        bail!(
            "{} of {} layout batches failed: {:?}",
            report.failed_batches.len(),
            report.total.div_ceil(config.layout.batch_size.max(1)),
            report.failed_batches
        );
    }

    Ok(())
}
