//! Availability domain types: tri-state slot values, stored slot rows, and
//! the materialized per-slot aggregate counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::SlotIndex;
use crate::api::UserId;

/// Tri-state availability value, wire-encoded as a small integer.
///
/// `Unavailable` rows are never persisted; absence of a row is equivalent to
/// `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SlotState {
    Unavailable = 0,
    Maybe = 1,
    Available = 2,
}

impl SlotState {
    /// Parse a raw integer state, returning `None` outside the {0, 1, 2}
    /// whitelist.
    pub fn from_raw(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Unavailable),
            1 => Some(Self::Maybe),
            2 => Some(Self::Available),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Storage encoding (SMALLINT column).
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }
}

impl TryFrom<i32> for SlotState {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Self::from_raw(v).ok_or_else(|| format!("invalid slot state: {}", v))
    }
}

impl From<SlotState> for i32 {
    fn from(s: SlotState) -> Self {
        s.as_i32()
    }
}

/// One stored availability row: a user's state for one half-hour bucket.
///
/// At most one row exists per `(user_id, slot_index)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub user_id: UserId,
    pub slot_index: SlotIndex,
    pub state: SlotState,
    pub updated_at: DateTime<Utc>,
}

/// Materialized per-slot counts of available and maybe users, derived
/// entirely from [`AvailabilitySlot`] rows at the same slot index. Owned and
/// recomputed exclusively by the aggregate maintainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSlotCount {
    pub slot_index: SlotIndex,
    pub available_count: i32,
    pub maybe_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Raw bulk-update entry as received on the wire, before state validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SlotEntry {
    pub slot_index: i64,
    pub state: i32,
}

/// Confidence threshold for availability queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// All persisted states (Maybe and Available).
    #[default]
    All,
    /// Available rows only.
    Available,
    /// Available or Maybe rows.
    AvailableMaybe,
}

impl Confidence {
    /// Whether a stored state passes this threshold.
    ///
    /// `Unavailable` never appears here: such rows are not persisted.
    pub fn admits(&self, state: SlotState) -> bool {
        match self {
            Self::All => true,
            Self::Available => state == SlotState::Available,
            Self::AvailableMaybe => matches!(state, SlotState::Available | SlotState::Maybe),
        }
    }
}

/// Filter predicate for slot queries.
///
/// The slot range is inclusive on both ends and applies only when both bounds
/// are present. Row order in results is implementation-defined.
#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub start_slot: Option<SlotIndex>,
    pub end_slot: Option<SlotIndex>,
    pub user_ids: Option<Vec<UserId>>,
    pub confidence: Confidence,
}

impl SlotFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(mut self, start: SlotIndex, end: SlotIndex) -> Self {
        self.start_slot = Some(start);
        self.end_slot = Some(end);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_ids = Some(vec![user_id]);
        self
    }

    pub fn users(mut self, user_ids: Vec<UserId>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Check a row against the filter (used by the in-memory backend).
    pub fn matches(&self, slot: &AvailabilitySlot) -> bool {
        if let (Some(start), Some(end)) = (self.start_slot, self.end_slot) {
            if slot.slot_index < start || slot.slot_index > end {
                return false;
            }
        }
        if let Some(ref ids) = self.user_ids {
            if !ids.contains(&slot.user_id) {
                return false;
            }
        }
        self.confidence.admits(slot.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_raw_whitelist() {
        assert_eq!(SlotState::from_raw(0), Some(SlotState::Unavailable));
        assert_eq!(SlotState::from_raw(1), Some(SlotState::Maybe));
        assert_eq!(SlotState::from_raw(2), Some(SlotState::Available));
        assert_eq!(SlotState::from_raw(3), None);
        assert_eq!(SlotState::from_raw(-1), None);
    }

    #[test]
    fn test_state_serde_as_integer() {
        let json = serde_json::to_string(&SlotState::Available).unwrap();
        assert_eq!(json, "2");

        let state: SlotState = serde_json::from_str("1").unwrap();
        assert_eq!(state, SlotState::Maybe);

        assert!(serde_json::from_str::<SlotState>("7").is_err());
    }

    #[test]
    fn test_confidence_admits() {
        assert!(Confidence::All.admits(SlotState::Maybe));
        assert!(Confidence::Available.admits(SlotState::Available));
        assert!(!Confidence::Available.admits(SlotState::Maybe));
        assert!(Confidence::AvailableMaybe.admits(SlotState::Maybe));
        assert!(Confidence::AvailableMaybe.admits(SlotState::Available));
    }

    #[test]
    fn test_confidence_serde_names() {
        assert_eq!(
            serde_json::from_str::<Confidence>("\"available_maybe\"").unwrap(),
            Confidence::AvailableMaybe
        );
        assert_eq!(
            serde_json::from_str::<Confidence>("\"all\"").unwrap(),
            Confidence::All
        );
    }

    #[test]
    fn test_filter_range_is_inclusive() {
        let filter = SlotFilter::new().range(SlotIndex::new(10), SlotIndex::new(12));
        let row = |idx: i64| AvailabilitySlot {
            user_id: UserId::new(1),
            slot_index: SlotIndex::new(idx),
            state: SlotState::Available,
            updated_at: chrono::Utc::now(),
        };
        assert!(filter.matches(&row(10)));
        assert!(filter.matches(&row(12)));
        assert!(!filter.matches(&row(9)));
        assert!(!filter.matches(&row(13)));
    }
}
