// Entity state: bulk reducer, bounded history, push-update merger, live store

mod engine;
mod entity;
pub mod history;
pub mod merger;
pub mod reducer;

pub use engine::{LoadStatus, StateEngine, DEFAULT_COMPACTION_THRESHOLD};
pub use entity::{Entity, EntityMap, PropertyState, StateUpdate};
pub use history::{HistoryEntry, PropertyChange, PropertyHistory, HISTORY_CAP};
pub use merger::{apply_delta, DeltaOutcome, EntityDelta, UnknownEntityPolicy};
pub use reducer::reduce;

#[cfg(test)]
mod tests;
