use crate::state::{UnknownEntityPolicy, DEFAULT_COMPACTION_THRESHOLD};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "vigil.toml";

/// Longest accepted layout lifetime (100 years)
pub const MAX_TTL_DAYS: i64 = 36_500;

/// Complete Vigil configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Upstream producer endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,
    #[serde(default = "default_history_url")]
    pub history_url: String,
    /// Push channel (WebSocket) URL
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Delay before reconnecting the push channel; 0 disables reconnecting
    #[serde(default)]
    pub reconnect_delay_seconds: u64,
    #[serde(default)]
    pub unknown_entity_policy: UnknownEntityPolicy,
    /// Change log length that triggers compaction of superseded events
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: usize,
}

fn default_snapshot_url() -> String {
    "http://localhost:8080/api/snapshot".to_string()
}

fn default_history_url() -> String {
    "http://localhost:8080/api/history".to_string()
}

fn default_feed_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_compaction_threshold() -> usize {
    DEFAULT_COMPACTION_THRESHOLD
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            snapshot_url: default_snapshot_url(),
            history_url: default_history_url(),
            feed_url: default_feed_url(),
            request_timeout_seconds: default_request_timeout(),
            reconnect_delay_seconds: 0,
            unknown_entity_policy: UnknownEntityPolicy::default(),
            compaction_threshold: default_compaction_threshold(),
        }
    }
}

/// HTTP/WebSocket API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// History rows returned when the query gives no limit
    #[serde(default = "default_history_limit")]
    pub history_default_limit: usize,
    /// Upper clamp for the history `limit` parameter
    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_history_max_limit() -> usize {
    500
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max_limit(),
        }
    }
}

/// Layout generator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Lifetime of a generated layout record, 1..=`MAX_TTL_DAYS`
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/catalog.json")
}

fn default_batch_size() -> usize {
    25
}

fn default_ttl_days() -> i64 {
    30
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            catalog_path: default_catalog_path(),
            batch_size: default_batch_size(),
            ttl_days: default_ttl_days(),
        }
    }
}

/// Position store location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("layout.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl VigilConfig {
    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TTL_DAYS).contains(&self.layout.ttl_days) {
            bail!(
                "layout.ttl_days must be between 1 and {}, got {}",
                MAX_TTL_DAYS,
                self.layout.ttl_days
            );
        }
        if self.layout.batch_size == 0 {
            bail!("layout.batch_size must be at least 1");
        }
        if self.feed.compaction_threshold == 0 {
            bail!("feed.compaction_threshold must be at least 1");
        }
        Ok(())
    }

    /// Apply `VIGIL_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("VIGIL_SNAPSHOT_URL") {
            self.feed.snapshot_url = v;
        }
        if let Some(v) = lookup("VIGIL_HISTORY_URL") {
            self.feed.history_url = v;
        }
        if let Some(v) = lookup("VIGIL_FEED_URL") {
            self.feed.feed_url = v;
        }
        if let Some(v) = lookup("VIGIL_BIND_ADDR") {
            self.api.bind_addr = v;
        }
        if let Some(v) = lookup("VIGIL_LAYOUT_DB") {
            self.store.db_path = PathBuf::from(v);
        }
    }
}

/// Config path from `VIGIL_CONFIG`, else `vigil.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("VIGIL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from a TOML file; a missing file yields defaults.
///
/// Environment overrides are applied on top either way, then the result is
/// validated.
pub fn load_config(path: &Path) -> Result<VigilConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?
    } else {
        VigilConfig::default()
    };
    config.apply_env();
    config
        .validate()
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}
