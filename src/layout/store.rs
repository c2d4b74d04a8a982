//! Persistence for generated layouts.
//!
//! Records are keyed by entity id and carry an expiry, so a re-run with the
//! same catalog overwrites identical rows and a stale layout ages out.

use super::positions::EntityPosition;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Fixed-width UTC text so SQLite string comparison orders by time
fn sql_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A generated position plus its forward expiration marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPosition {
    #[serde(flatten)]
    pub position: EntityPosition,
    pub expires_at: DateTime<Utc>,
}

/// Destination for layout batches.
///
/// Each call is one batch; implementations must make a batch all-or-nothing.
pub trait PositionSink: Send + Sync {
    fn write_batch(&self, batch: &[StoredPosition]) -> Result<()>;
}

/// Layout store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE entity_positions (
///     entity_id TEXT PRIMARY KEY,
///     entity_type TEXT NOT NULL,
///     record TEXT NOT NULL,      -- EntityPosition as JSON
///     expires_at TEXT NOT NULL,  -- RFC 3339, microseconds, Z
///     updated_at TEXT NOT NULL
/// );
/// ```
pub struct SqlitePositionStore {
    conn: Mutex<Connection>,
}

impl SqlitePositionStore {
    /// Creates or opens a position store (`:memory:` is accepted).
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open layout database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entity_positions (
                entity_id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                record TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create entity_positions table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_expiry ON entity_positions(expires_at)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Positions whose expiry lies after `now`, ordered by entity id.
    pub fn load_active(&self, now: DateTime<Utc>) -> Result<Vec<EntityPosition>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT record FROM entity_positions WHERE expires_at > ?1 ORDER BY entity_id",
            )
            .context("Failed to prepare query")?;

        let records = stmt
            .query_map(params![sql_time(now)], |row| row.get::<_, String>(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        records
            .iter()
            .map(|json| serde_json::from_str(json).context("Corrupt position record"))
            .collect()
    }

    /// Delete expired rows; returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .conn
            .lock()
            .unwrap()
            .execute(
                "DELETE FROM entity_positions WHERE expires_at <= ?1",
                params![sql_time(now)],
            )
            .context("Failed to purge expired positions")?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entity_positions", [], |row| row.get(0))
            .context("Failed to count positions")?;
        Ok(count as usize)
    }
}

impl PositionSink for SqlitePositionStore {
    fn write_batch(&self, batch: &[StoredPosition]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let now = sql_time(Utc::now());

        for stored in batch {
            let record =
                serde_json::to_string(&stored.position).context("Failed to encode position")?;
            tx.execute(
                r#"
                INSERT INTO entity_positions
                    (entity_id, entity_type, record, expires_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(entity_id) DO UPDATE SET
                    entity_type = excluded.entity_type,
                    record = excluded.record,
                    expires_at = excluded.expires_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    stored.position.entity_id,
                    stored.position.entity_type,
                    record,
                    sql_time(stored.expires_at),
                    now,
                ],
            )
            .with_context(|| {
                format!("Failed to write position for {}", stored.position.entity_id)
            })?;
        }

        tx.commit().context("Failed to commit batch")?;
        Ok(())
    }
}
