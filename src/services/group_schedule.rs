//! Group schedule pivot: per-slot member states for a group's roster.

use std::collections::BTreeMap;

use crate::api::{GroupId, GroupScheduleData, GroupScheduleSlot, UserId};
use crate::db::repository::{
    AvailabilityRepository, FullRepository, GroupRepository, RepositoryResult,
};
use crate::models::{SlotFilter, SlotIndex, SlotState};

/// Pivot the group members' availability over the inclusive slot range into
/// one entry per slot index that has at least one stored row: the
/// member→state map, the count of Available members, and the roster size.
///
/// Membership access control is the caller's concern; an empty roster yields
/// an empty dataset.
pub async fn group_schedule_data(
    repo: &dyn FullRepository,
    group_id: GroupId,
    start_slot: i64,
    end_slot: i64,
) -> RepositoryResult<GroupScheduleData> {
    let member_ids: Vec<UserId> = repo
        .group_members(group_id)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    if member_ids.is_empty() {
        return Ok(GroupScheduleData { slots: vec![] });
    }

    let filter = SlotFilter::new()
        .range(SlotIndex::new(start_slot), SlotIndex::new(end_slot))
        .users(member_ids.clone());

    let mut per_slot: BTreeMap<i64, BTreeMap<i64, SlotState>> = BTreeMap::new();
    for row in repo.query_slots(&filter).await? {
        per_slot
            .entry(row.slot_index.value())
            .or_default()
            .insert(row.user_id.value(), row.state);
    }

    let total_members = member_ids.len();
    let slots = per_slot
        .into_iter()
        .map(|(slot_index, user_states)| {
            let available_count = user_states
                .values()
                .filter(|s| **s == SlotState::Available)
                .count();
            GroupScheduleSlot {
                slot_index: SlotIndex::new(slot_index),
                user_states,
                available_count,
                total_members,
            }
        })
        .collect();

    Ok(GroupScheduleData { slots })
}
