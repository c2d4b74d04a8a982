use super::catalog::Catalog;
use super::positions::generate_positions;
use super::store::{PositionSink, StoredPosition};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info};

/// Outcome of one generation run; partial success is a valid terminal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutRunReport {
    pub total: usize,
    pub written: usize,
    pub failed_batches: Vec<usize>,
}

impl LayoutRunReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Generate positions for the whole catalog and persist them in batches.
///
/// A failing batch is logged with its index and skipped; later batches are
/// still written. Errors only when `now + ttl` is not a representable instant,
/// before anything is written.
pub fn run_layout_job(
    catalog: &Catalog,
    sink: &dyn PositionSink,
    batch_size: usize,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<LayoutRunReport> {
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| anyhow!("layout expiry out of range: {} + {}", now, ttl))?;
    let records: Vec<StoredPosition> = generate_positions(catalog)
        .into_iter()
        .map(|position| StoredPosition {
            position,
            expires_at,
        })
        .collect();

    let mut report = LayoutRunReport {
        total: records.len(),
        ..Default::default()
    };

    for (batch_index, batch) in records.chunks(batch_size.max(1)).enumerate() {
        match sink.write_batch(batch) {
            Ok(()) => {
                report.written += batch.len();
                info!(batch = batch_index, size = batch.len(), "Wrote layout batch");
            }
            Err(e) => {
                error!(batch = batch_index, error = %e, "Failed to write layout batch");
                report.failed_batches.push(batch_index);
            }
        }
    }

    info!(
        version = %catalog.version,
        total = report.total,
        written = report.written,
        failed = report.failed_batches.len(),
        "Layout generation finished"
    );

    Ok(report)
}
