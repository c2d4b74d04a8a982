use crate::event::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum number of changes retained per property
pub const HISTORY_CAP: usize = 10;

/// One recorded change of a property
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChange {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<PropertyValue>,
    pub new_value: PropertyValue,
}

/// A property change addressed by entity and property, as served by the
/// history query interface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub entity_id: String,
    pub property: String,
    #[serde(flatten)]
    pub change: PropertyChange,
}

/// Fixed-capacity change log for one property; the oldest entry is evicted
/// first once `HISTORY_CAP` is reached.
///
/// Serialized as a plain array. Deserializing re-applies the cap, keeping the
/// newest entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PropertyChange>", into = "Vec<PropertyChange>")]
pub struct PropertyHistory {
    entries: VecDeque<PropertyChange>,
}

impl PropertyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change, evicting from the front while over capacity
    pub fn push(&mut self, change: PropertyChange) {
        self.entries.push_back(change);
        while self.entries.len() > HISTORY_CAP {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PropertyChange> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&PropertyChange> {
        self.entries.back()
    }
}

impl From<Vec<PropertyChange>> for PropertyHistory {
    fn from(changes: Vec<PropertyChange>) -> Self {
        let mut history = PropertyHistory::new();
        for change in changes {
            history.push(change);
        }
        history
    }
}

impl From<PropertyHistory> for Vec<PropertyChange> {
    fn from(history: PropertyHistory) -> Self {
        history.entries.into_iter().collect()
    }
}
