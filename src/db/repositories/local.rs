//! In-memory repository for unit testing and local development.
//!
//! All state lives behind a single `parking_lot::RwLock`, so every write
//! path — row mutations plus the aggregate recompute that follows them — runs
//! under one write guard and becomes visible to readers atomically. This is
//! the in-memory analogue of the Postgres backend's per-request transaction.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::api::{GroupId, InviteId, UserId};
use crate::db::repository::{
    AvailabilityRepository, ErrorContext, GroupRepository, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::models::{
    AggregateSlotCount, AvailabilitySlot, Group, GroupInvite, GroupMember, InviteStatus, NewUser,
    ProfileUpdate, SlotFilter, SlotIndex, SlotState, User, UserFilter, DEFAULT_GROUP_SIZE,
};

#[derive(Debug, Clone)]
struct StoredSlot {
    state: SlotState,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredAggregate {
    available_count: i32,
    maybe_count: i32,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LocalState {
    next_user_id: i64,
    users: BTreeMap<i64, User>,
    /// Keyed by (user_id, slot_index); the map key enforces the
    /// one-row-per-pair invariant.
    slots: BTreeMap<(i64, i64), StoredSlot>,
    aggregates: BTreeMap<i64, StoredAggregate>,
    next_group_id: i64,
    groups: BTreeMap<i64, Group>,
    memberships: Vec<GroupMember>,
    next_invite_id: i64,
    invites: BTreeMap<i64, GroupInvite>,
}

impl LocalState {
    /// Apply one slot mutation. Returns true when a row was actually
    /// inserted, updated, or deleted (no-op writes don't dirty the slot).
    fn apply_slot_mutation(
        &mut self,
        user_id: UserId,
        slot_index: SlotIndex,
        state: SlotState,
    ) -> bool {
        let key = (user_id.value(), slot_index.value());
        match state {
            // Unavailable rows are not persisted; revert-to-unavailable deletes
            SlotState::Unavailable => self.slots.remove(&key).is_some(),
            _ => match self.slots.get_mut(&key) {
                Some(existing) if existing.state == state => false,
                Some(existing) => {
                    existing.state = state;
                    existing.updated_at = Utc::now();
                    true
                }
                None => {
                    self.slots.insert(
                        key,
                        StoredSlot {
                            state,
                            updated_at: Utc::now(),
                        },
                    );
                    true
                }
            },
        }
    }

    /// Full recount of one slot index from the slot rows.
    ///
    /// A row is created on first non-zero count and then kept even when the
    /// counts later return to zero.
    fn recompute_aggregate(&mut self, slot_index: i64) {
        let mut available_count = 0;
        let mut maybe_count = 0;
        for ((_, idx), slot) in self.slots.iter() {
            if *idx != slot_index {
                continue;
            }
            match slot.state {
                SlotState::Available => available_count += 1,
                SlotState::Maybe => maybe_count += 1,
                SlotState::Unavailable => {}
            }
        }

        if let Some(aggregate) = self.aggregates.get_mut(&slot_index) {
            aggregate.available_count = available_count;
            aggregate.maybe_count = maybe_count;
            aggregate.updated_at = Utc::now();
        } else if available_count + maybe_count > 0 {
            self.aggregates.insert(
                slot_index,
                StoredAggregate {
                    available_count,
                    maybe_count,
                    updated_at: Utc::now(),
                },
            );
        }
    }

    fn member_count(&self, group_id: GroupId) -> usize {
        self.memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .count()
    }

    fn is_member(&self, group_id: GroupId, user_id: UserId) -> bool {
        self.memberships
            .iter()
            .any(|m| m.group_id == group_id && m.user_id == user_id)
    }
}

/// In-memory implementation of the full repository.
#[derive(Default)]
pub struct LocalRepository {
    state: RwLock<LocalState>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(true)
    }

    async fn set_slot(
        &self,
        user_id: UserId,
        slot_index: SlotIndex,
        state: SlotState,
    ) -> RepositoryResult<()> {
        let mut st = self.state.write();
        if st.apply_slot_mutation(user_id, slot_index, state) {
            st.recompute_aggregate(slot_index.value());
        }
        Ok(())
    }

    async fn bulk_set_slots(
        &self,
        user_id: UserId,
        entries: &[(SlotIndex, SlotState)],
    ) -> RepositoryResult<usize> {
        let mut st = self.state.write();

        // Transaction-scoped dirty set: recompute once per distinct index,
        // after all row mutations of the batch.
        let mut dirty: BTreeSet<i64> = BTreeSet::new();
        let mut applied = 0;
        for (slot_index, state) in entries {
            if st.apply_slot_mutation(user_id, *slot_index, *state) {
                dirty.insert(slot_index.value());
                applied += 1;
            }
        }
        for slot_index in dirty {
            st.recompute_aggregate(slot_index);
        }
        Ok(applied)
    }

    async fn query_slots(&self, filter: &SlotFilter) -> RepositoryResult<Vec<AvailabilitySlot>> {
        let st = self.state.read();
        let rows = st
            .slots
            .iter()
            .map(|((user_id, slot_index), stored)| AvailabilitySlot {
                user_id: UserId::new(*user_id),
                slot_index: SlotIndex::new(*slot_index),
                state: stored.state,
                updated_at: stored.updated_at,
            })
            .filter(|row| filter.matches(row))
            .collect();
        Ok(rows)
    }

    async fn fetch_aggregates(
        &self,
        start_slot: Option<SlotIndex>,
        end_slot: Option<SlotIndex>,
    ) -> RepositoryResult<Vec<AggregateSlotCount>> {
        let st = self.state.read();
        let rows = st
            .aggregates
            .iter()
            .filter(|(slot_index, _)| match (start_slot, end_slot) {
                (Some(start), Some(end)) => {
                    **slot_index >= start.value() && **slot_index <= end.value()
                }
                _ => true,
            })
            .map(|(slot_index, aggregate)| AggregateSlotCount {
                slot_index: SlotIndex::new(*slot_index),
                available_count: aggregate.available_count,
                maybe_count: aggregate.maybe_count,
                updated_at: aggregate.updated_at,
            })
            .collect();
        Ok(rows)
    }

    async fn rebuild_aggregates(&self) -> RepositoryResult<usize> {
        let mut st = self.state.write();
        st.aggregates.clear();
        let indices: BTreeSet<i64> = st.slots.keys().map(|(_, slot_index)| *slot_index).collect();
        let rebuilt = indices.len();
        for slot_index in indices {
            st.recompute_aggregate(slot_index);
        }
        Ok(rebuilt)
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn create_user(&self, user: &NewUser) -> RepositoryResult<User> {
        if user.character_name.trim().is_empty() {
            return Err(RepositoryError::validation("Character name is required"));
        }

        let mut st = self.state.write();
        if st
            .users
            .values()
            .any(|u| u.character_name == user.character_name)
        {
            return Err(RepositoryError::validation_with_context(
                "Character name already taken",
                ErrorContext::new("create_user").with_details(user.character_name.clone()),
            ));
        }

        st.next_user_id += 1;
        let created = User {
            user_id: UserId::new(st.next_user_id),
            character_name: user.character_name.clone(),
            character_class: user.character_class.clone(),
            roles: user.roles.clone(),
            timezone: user.timezone.clone(),
            is_admin: false,
            created_at: Utc::now(),
        };
        st.users.insert(created.user_id.value(), created.clone());
        Ok(created)
    }

    async fn get_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.state
            .read()
            .users
            .get(&user_id.value())
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "User not found",
                    ErrorContext::new("get_user")
                        .with_entity("user")
                        .with_entity_id(user_id),
                )
            })
    }

    async fn find_user(&self, user_id: UserId) -> RepositoryResult<Option<User>> {
        Ok(self.state.read().users.get(&user_id.value()).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> RepositoryResult<Vec<User>> {
        let st = self.state.read();
        let mut users: Vec<User> = st
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.character_name.cmp(&b.character_name));
        Ok(users)
    }

    async fn update_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
    ) -> RepositoryResult<User> {
        let mut st = self.state.write();
        let user = st.users.get_mut(&user_id.value()).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                "User not found",
                ErrorContext::new("update_profile")
                    .with_entity("user")
                    .with_entity_id(user_id),
            )
        })?;

        if let Some(ref class) = update.character_class {
            user.character_class = class.clone();
        }
        if let Some(ref roles) = update.roles {
            user.roles = roles.clone();
        }
        if let Some(ref timezone) = update.timezone {
            user.timezone = Some(timezone.clone());
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl GroupRepository for LocalRepository {
    async fn create_group(&self, name: &str, leader_id: UserId) -> RepositoryResult<Group> {
        let mut st = self.state.write();
        if st.groups.values().any(|g| g.name == name) {
            return Err(RepositoryError::validation_with_context(
                "Group name already taken",
                ErrorContext::new("create_group").with_details(name.to_string()),
            ));
        }

        st.next_group_id += 1;
        let group = Group {
            group_id: GroupId::new(st.next_group_id),
            name: name.to_string(),
            leader_id,
            max_size: DEFAULT_GROUP_SIZE,
            created_at: Utc::now(),
        };
        st.groups.insert(group.group_id.value(), group.clone());
        st.memberships.push(GroupMember {
            group_id: group.group_id,
            user_id: leader_id,
            joined_at: Utc::now(),
        });
        Ok(group)
    }

    async fn get_group(&self, group_id: GroupId) -> RepositoryResult<Group> {
        self.state
            .read()
            .groups
            .get(&group_id.value())
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "Group not found",
                    ErrorContext::new("get_group")
                        .with_entity("group")
                        .with_entity_id(group_id),
                )
            })
    }

    async fn groups_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>> {
        let st = self.state.read();
        let groups = st
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| st.groups.get(&m.group_id.value()).cloned())
            .collect();
        Ok(groups)
    }

    async fn group_members(&self, group_id: GroupId) -> RepositoryResult<Vec<GroupMember>> {
        let st = self.state.read();
        let mut members: Vec<GroupMember> = st
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<bool> {
        Ok(self.state.read().is_member(group_id, user_id))
    }

    async fn create_invite(
        &self,
        group_id: GroupId,
        inviter_id: UserId,
        invitee_id: UserId,
    ) -> RepositoryResult<GroupInvite> {
        let mut st = self.state.write();
        if !st.groups.contains_key(&group_id.value()) {
            return Err(RepositoryError::not_found("Group not found"));
        }
        if st.invites.values().any(|i| {
            i.group_id == group_id
                && i.invitee_id == invitee_id
                && i.status == InviteStatus::Pending
        }) {
            return Err(RepositoryError::validation(
                "Invite already pending for this user",
            ));
        }

        st.next_invite_id += 1;
        let invite = GroupInvite {
            invite_id: InviteId::new(st.next_invite_id),
            group_id,
            inviter_id,
            invitee_id,
            status: InviteStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
        };
        st.invites.insert(invite.invite_id.value(), invite.clone());
        Ok(invite)
    }

    async fn get_invite(&self, invite_id: InviteId) -> RepositoryResult<GroupInvite> {
        self.state
            .read()
            .invites
            .get(&invite_id.value())
            .cloned()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    "Invite not found",
                    ErrorContext::new("get_invite")
                        .with_entity("invite")
                        .with_entity_id(invite_id),
                )
            })
    }

    async fn pending_invites_for_group(
        &self,
        group_id: GroupId,
    ) -> RepositoryResult<Vec<GroupInvite>> {
        let st = self.state.read();
        let invites = st
            .invites
            .values()
            .filter(|i| i.group_id == group_id && i.status == InviteStatus::Pending)
            .cloned()
            .collect();
        Ok(invites)
    }

    async fn pending_invites_for_user(
        &self,
        user_id: UserId,
        created_after: DateTime<Utc>,
    ) -> RepositoryResult<Vec<GroupInvite>> {
        let st = self.state.read();
        let mut invites: Vec<GroupInvite> = st
            .invites
            .values()
            .filter(|i| {
                i.invitee_id == user_id
                    && i.status == InviteStatus::Pending
                    && i.created_at >= created_after
            })
            .cloned()
            .collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invites)
    }

    async fn expire_invites_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let mut st = self.state.write();
        let mut expired = 0;
        for invite in st.invites.values_mut() {
            if invite.status == InviteStatus::Pending && invite.created_at < cutoff {
                invite.status = InviteStatus::Expired;
                invite.responded_at = Some(Utc::now());
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn accept_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<Group> {
        let mut st = self.state.write();

        let invite = st
            .invites
            .get(&invite_id.value())
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Invite not found"))?;
        if invite.invitee_id != invitee_id {
            return Err(RepositoryError::validation(
                "Invite is not addressed to this user",
            ));
        }
        if invite.status != InviteStatus::Pending {
            return Err(RepositoryError::validation(format!(
                "Invite is {}",
                invite.status
            )));
        }

        let group = st
            .groups
            .get(&invite.group_id.value())
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Group not found"))?;
        if st.is_member(group.group_id, invitee_id) {
            return Err(RepositoryError::validation(
                "User is already a member of this group",
            ));
        }
        if st.member_count(group.group_id) >= group.max_size as usize {
            return Err(RepositoryError::validation("Group is full"));
        }

        if let Some(invite) = st.invites.get_mut(&invite_id.value()) {
            invite.status = InviteStatus::Accepted;
            invite.responded_at = Some(Utc::now());
        }
        st.memberships.push(GroupMember {
            group_id: group.group_id,
            user_id: invitee_id,
            joined_at: Utc::now(),
        });
        Ok(group)
    }

    async fn decline_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<()> {
        let mut st = self.state.write();
        let invite = st
            .invites
            .get_mut(&invite_id.value())
            .ok_or_else(|| RepositoryError::not_found("Invite not found"))?;
        if invite.invitee_id != invitee_id {
            return Err(RepositoryError::validation(
                "Invite is not addressed to this user",
            ));
        }
        if invite.status != InviteStatus::Pending {
            return Err(RepositoryError::validation(format!(
                "Invite is already {}",
                invite.status
            )));
        }
        invite.status = InviteStatus::Declined;
        invite.responded_at = Some(Utc::now());
        Ok(())
    }

    async fn leave_group(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<()> {
        let mut st = self.state.write();
        if !st.groups.contains_key(&group_id.value()) {
            return Err(RepositoryError::not_found("Group not found"));
        }
        let position = st
            .memberships
            .iter()
            .position(|m| m.group_id == group_id && m.user_id == user_id)
            .ok_or_else(|| {
                RepositoryError::validation("You are not a member of this group")
            })?;

        // Leader hand-off: promote the earliest remaining joiner
        let next_leader = st
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id && m.user_id != user_id)
            .min_by_key(|m| m.joined_at)
            .map(|m| m.user_id);
        if let Some(group) = st.groups.get_mut(&group_id.value()) {
            if group.leader_id == user_id {
                if let Some(next_leader) = next_leader {
                    group.leader_id = next_leader;
                }
            }
        }

        st.memberships.remove(position);
        Ok(())
    }

    async fn disband_group(&self, group_id: GroupId) -> RepositoryResult<()> {
        let mut st = self.state.write();
        if st.groups.remove(&group_id.value()).is_none() {
            return Err(RepositoryError::not_found("Group not found"));
        }
        st.memberships.retain(|m| m.group_id != group_id);
        st.invites.retain(|_, i| i.group_id != group_id);
        Ok(())
    }
}
