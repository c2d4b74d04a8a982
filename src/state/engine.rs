use crate::event::ChangeEvent;
use crate::feed::FeedStats;
use crate::metrics::{aggregate_at, compact, AggregatedMetrics};
use crate::state::entity::{Entity, EntityMap, StateUpdate};
use crate::state::merger::{self, DeltaOutcome, EntityDelta, UnknownEntityPolicy};
use crate::state::reducer::reduce;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Progress of the initial bulk snapshot
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadStatus {
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for LoadStatus {
    fn default() -> Self {
        Self {
            loading: true,
            error: None,
        }
    }
}

/// Change log length that triggers the first compaction
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 10_000;

/// Bulk events plus every applied delta, in arrival order.
///
/// `generation` moves on every append or replacement and keys the metrics
/// cache. Compaction leaves it alone since it never changes the metrics.
struct ChangeLog {
    events: Arc<Vec<ChangeEvent>>,
    generation: u64,
    compact_at: usize,
}

impl ChangeLog {
    fn compact_if_due(&mut self, threshold: usize, today: NaiveDate) {
        if self.events.len() < self.compact_at {
            return;
        }
        let before = self.events.len();
        self.events = Arc::new(compact(&self.events, today));
        // Next pass once the survivors have doubled
        self.compact_at = (self.events.len() * 2).max(threshold);
        debug!(before = before, after = self.events.len(), "Change log compacted");
    }
}

/// State engine owns the live entity collection and the change log.
///
/// All mutation goes through `load_snapshot`, `apply_full_list` and
/// `apply_delta`; each holds the write lock for its whole duration, so there is
/// exactly one writer at any instant. Readers get `Arc` snapshots that never
/// change underneath them (writes are copy-on-write).
pub struct StateEngine {
    entities: RwLock<Arc<EntityMap>>,

    change_log: RwLock<ChangeLog>,

    /// Metrics keyed by change log generation and the UTC day they cover
    metrics_cache: Mutex<Option<((u64, NaiveDate), Arc<AggregatedMetrics>)>>,

    compaction_threshold: usize,

    /// Broadcast channel for collection changes
    state_tx: broadcast::Sender<StateUpdate>,

    unknown_entity_policy: UnknownEntityPolicy,

    load_status: RwLock<LoadStatus>,

    /// Push channel counters
    pub stats: FeedStats,
}

impl StateEngine {
    pub fn new(unknown_entity_policy: UnknownEntityPolicy) -> Self {
        let (state_tx, _) = broadcast::channel(1000);

        Self {
            entities: RwLock::new(Arc::new(EntityMap::new())),
            change_log: RwLock::new(ChangeLog {
                events: Arc::new(Vec::new()),
                generation: 0,
                compact_at: DEFAULT_COMPACTION_THRESHOLD,
            }),
            metrics_cache: Mutex::new(None),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            state_tx,
            unknown_entity_policy,
            load_status: RwLock::new(LoadStatus::default()),
            stats: FeedStats::new(),
        }
    }

    /// Compact the change log whenever it reaches `threshold` events, and
    /// again each time the surviving events have doubled.
    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        self.compaction_threshold = threshold;
        self.change_log.get_mut().unwrap().compact_at = threshold;
        self
    }

    /// Replace everything with the reduction of a bulk snapshot.
    pub fn load_snapshot(&self, events: Vec<ChangeEvent>) -> usize {
        let reduced = reduce(&events);
        let entity_count = reduced.len();

        {
            let mut entities = self.entities.write().unwrap();
            let mut log = self.change_log.write().unwrap();
            *entities = Arc::new(reduced);
            log.events = Arc::new(events);
            log.generation += 1;
            log.compact_at = self.compaction_threshold;
            log.compact_if_due(self.compaction_threshold, Utc::now().date_naive());
        }

        *self.load_status.write().unwrap() = LoadStatus {
            loading: false,
            error: None,
        };

        info!(entities = entity_count, "Loaded bulk snapshot");
        let _ = self.state_tx.send(StateUpdate::Replaced { entity_count });
        entity_count
    }

    /// Replace the entity collection from a full-list frame.
    ///
    /// The change log is left as is.
    pub fn apply_full_list(&self, list: Vec<Entity>) -> usize {
        let replacement: EntityMap = list.into_iter().map(|e| (e.id.clone(), e)).collect();
        let entity_count = replacement.len();

        *self.entities.write().unwrap() = Arc::new(replacement);

        info!(entities = entity_count, "Entity collection replaced from full list");
        let _ = self.state_tx.send(StateUpdate::Replaced { entity_count });
        entity_count
    }

    /// Apply a single-property delta from the push channel.
    pub fn apply_delta(&self, delta: &EntityDelta) -> DeltaOutcome {
        let mut entities = self.entities.write().unwrap();

        // Checked before make_mut so a dropped delta never copies the map
        if self.unknown_entity_policy == UnknownEntityPolicy::Drop
            && !entities.contains_key(&delta.entity_id)
        {
            self.stats.record_unknown_entity();
            debug!(entity_id = %delta.entity_id, "Delta for unknown entity dropped");
            return DeltaOutcome::UnknownEntity;
        }

        let map = Arc::make_mut(&mut entities);
        let outcome = merger::apply_delta(map, delta, self.unknown_entity_policy);

        let entity_type = map
            .get(&delta.entity_id)
            .map(|e| e.entity_type.clone())
            .unwrap_or_default();

        {
            let mut log = self.change_log.write().unwrap();
            Arc::make_mut(&mut log.events).push(delta.to_change_event(&entity_type));
            log.generation += 1;
            log.compact_if_due(self.compaction_threshold, Utc::now().date_naive());
        }
        drop(entities);

        self.stats.record_delta();
        let _ = self.state_tx.send(StateUpdate::Changed(delta.clone()));
        outcome
    }

    /// Current collection; never mutated after it is handed out
    pub fn snapshot(&self) -> Arc<EntityMap> {
        Arc::clone(&self.entities.read().unwrap())
    }

    pub fn get_entity(&self, entity_id: &str) -> Option<Entity> {
        self.entities.read().unwrap().get(entity_id).cloned()
    }

    /// Sorted by id
    pub fn get_all_entities(&self) -> Vec<Entity> {
        let snapshot = self.snapshot();
        let mut entities: Vec<Entity> = snapshot.values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        entities
    }

    pub fn change_log(&self) -> Arc<Vec<ChangeEvent>> {
        Arc::clone(&self.change_log.read().unwrap().events)
    }

    /// Drop change events that no longer affect metrics for `today` or any
    /// later day. Returns the number of events removed.
    pub fn compact_change_log(&self, today: NaiveDate) -> usize {
        let mut log = self.change_log.write().unwrap();
        let before = log.events.len();
        log.events = Arc::new(compact(&log.events, today));
        before - log.events.len()
    }

    /// Aggregate metrics, recomputed only when the change log or the UTC day
    /// has changed since the last call.
    pub fn metrics(&self) -> Arc<AggregatedMetrics> {
        self.metrics_at(Utc::now().date_naive())
    }

    /// Aggregate metrics relative to the given UTC date
    pub fn metrics_at(&self, today: NaiveDate) -> Arc<AggregatedMetrics> {
        let (events, generation) = {
            let log = self.change_log.read().unwrap();
            (Arc::clone(&log.events), log.generation)
        };
        let key = (generation, today);
        let mut cache = self.metrics_cache.lock().unwrap();

        if let Some((cached, metrics)) = cache.as_ref() {
            if *cached == key {
                return Arc::clone(metrics);
            }
        }

        let metrics = Arc::new(aggregate_at(&events, today));
        *cache = Some((key, Arc::clone(&metrics)));
        metrics
    }

    /// Subscribe to collection changes
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.state_tx.subscribe()
    }

    pub fn load_status(&self) -> LoadStatus {
        self.load_status.read().unwrap().clone()
    }

    /// Record a fatal snapshot fault; loading ends with a single error string.
    pub fn set_load_error(&self, error: String) {
        warn!(error = %error, "Bulk snapshot failed");
        *self.load_status.write().unwrap() = LoadStatus {
            loading: false,
            error: Some(error),
        };
    }
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new(UnknownEntityPolicy::default())
    }
}
