//! Public API surface for the Rust backend.
//!
//! This file consolidates the identifier newtypes and re-exports the domain
//! and route data types used by the HTTP API. All types derive
//! Serialize/Deserialize for JSON serialization.

pub use crate::routes::availability::AvailabilityData;
pub use crate::routes::availability::BulkUpdateOutcome;
pub use crate::routes::groups::GroupMemberView;
pub use crate::routes::groups::GroupScheduleData;
pub use crate::routes::groups::GroupScheduleSlot;
pub use crate::routes::groups::GroupView;
pub use crate::routes::groups::InviteView;
pub use crate::routes::heatmap::HeatmapData;
pub use crate::routes::matching::MatchCandidate;
pub use crate::routes::matching::MatchData;

use serde::{Deserialize, Serialize};

/// User identifier (database primary key).
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UserId(pub i64);

/// Group identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub i64);

/// Group invite identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteId(pub i64);

impl UserId {
    pub fn new(value: i64) -> Self {
        UserId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl GroupId {
    pub fn new(value: i64) -> Self {
        GroupId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl InviteId {
    pub fn new(value: i64) -> Self {
        InviteId(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for InviteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}
impl From<GroupId> for i64 {
    fn from(id: GroupId) -> Self {
        id.0
    }
}
impl From<InviteId> for i64 {
    fn from(id: InviteId) -> Self {
        id.0
    }
}

pub use crate::models::{
    AggregateSlotCount, AvailabilitySlot, Confidence, Group, GroupInvite, GroupMember,
    InviteStatus, NewUser, ProfileUpdate, SlotEntry, SlotFilter, SlotIndex, SlotState, User,
    UserFilter, SLOT_SECONDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_value() {
        let id = UserId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id = GroupId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: GroupId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }
}
