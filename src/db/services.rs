//! High-level service functions over the repository layer.
//!
//! These functions carry the business rules of the availability and group
//! workflows and work against any [`FullRepository`] implementation. Handlers
//! and bindings should call these rather than the repository directly.
//!
//! Permission decisions that depend on *who* is calling (leader-only,
//! invitee-only, member-only) live at the HTTP boundary; the rules here are
//! the data-integrity ones that hold for every caller.

use std::collections::HashSet;

use chrono::{Duration, Utc};

use crate::api::{
    AvailabilityData, BulkUpdateOutcome, GroupId, GroupMemberView, GroupView, HeatmapData,
    InviteId, InviteView, UserId,
};
use crate::db::repository::{
    AvailabilityRepository, FullRepository, GroupRepository, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::models::{
    Confidence, Group, GroupInvite, NewUser, ProfileUpdate, SlotEntry, SlotFilter, SlotIndex,
    SlotState, User, UserFilter,
};

/// Pending invites older than this are lazily marked expired.
pub const INVITE_EXPIRY_DAYS: i64 = 7;
/// Invite listings only surface pending invites younger than this.
pub const INVITE_VISIBLE_DAYS: i64 = 3;

/// Maximum accepted group name length.
const MAX_GROUP_NAME_LEN: usize = 100;

// =============================================================================
// Slot store
// =============================================================================

/// Set one slot for a user, validating the raw state against the
/// {0, 1, 2} whitelist.
pub async fn set_slot(
    repo: &dyn FullRepository,
    user_id: UserId,
    slot_index: i64,
    state: i32,
) -> RepositoryResult<()> {
    let state = SlotState::from_raw(state)
        .ok_or_else(|| RepositoryError::validation(format!("Invalid slot state: {}", state)))?;
    repo.set_slot(user_id, SlotIndex::new(slot_index), state).await
}

/// Bulk-apply slot entries for a user.
///
/// Entries with a state outside the whitelist are silently skipped (the
/// forgiving-write policy) and reported in the outcome; an empty input is a
/// validation error. The surviving entries commit as one transaction.
pub async fn bulk_set_slots(
    repo: &dyn FullRepository,
    user_id: UserId,
    entries: &[SlotEntry],
) -> RepositoryResult<BulkUpdateOutcome> {
    if entries.is_empty() {
        return Err(RepositoryError::validation("No slots provided"));
    }

    let mut valid = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for entry in entries {
        match SlotState::from_raw(entry.state) {
            Some(state) => valid.push((SlotIndex::new(entry.slot_index), state)),
            None => skipped += 1,
        }
    }

    let applied = if valid.is_empty() {
        0
    } else {
        repo.bulk_set_slots(user_id, &valid).await?
    };
    Ok(BulkUpdateOutcome { applied, skipped })
}

/// Parameters for the availability query.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityQueryParams {
    pub start_slot: Option<i64>,
    pub end_slot: Option<i64>,
    /// Restrict to one user (the `user_id=current` form is resolved by the
    /// caller).
    pub user_id: Option<UserId>,
    pub character_class: Option<String>,
    pub role: Option<String>,
    pub confidence: Confidence,
}

/// Availability query: slot rows plus the users they belong to.
///
/// With a specific user the result is that user's rows; otherwise the roster
/// filters (class/role) restrict whose rows are returned, and the user list
/// contains exactly the users appearing in the returned slots.
pub async fn query_availability(
    repo: &dyn FullRepository,
    params: &AvailabilityQueryParams,
) -> RepositoryResult<AvailabilityData> {
    let mut filter = SlotFilter::new().confidence(params.confidence);
    if let (Some(start), Some(end)) = (params.start_slot, params.end_slot) {
        filter = filter.range(SlotIndex::new(start), SlotIndex::new(end));
    }

    if let Some(user_id) = params.user_id {
        filter = filter.user(user_id);
        let slots = repo.query_slots(&filter).await?;
        // Unknown user degrades to an empty user list, not an error
        let users = repo.find_user(user_id).await?.into_iter().collect();
        return Ok(AvailabilityData { slots, users });
    }

    let roster_filter = UserFilter {
        character_class: params.character_class.clone(),
        role: params.role.clone(),
    };
    let has_roster_filter =
        roster_filter.character_class.is_some() || roster_filter.role.is_some();

    if has_roster_filter {
        let users = repo.list_users(&roster_filter).await?;
        if users.is_empty() {
            return Ok(AvailabilityData {
                slots: vec![],
                users: vec![],
            });
        }
        filter = filter.users(users.iter().map(|u| u.user_id).collect());
        let slots = repo.query_slots(&filter).await?;
        let with_slots: HashSet<UserId> = slots.iter().map(|s| s.user_id).collect();
        let users = users
            .into_iter()
            .filter(|u| with_slots.contains(&u.user_id))
            .collect();
        return Ok(AvailabilityData { slots, users });
    }

    let slots = repo.query_slots(&filter).await?;
    let with_slots: HashSet<UserId> = slots.iter().map(|s| s.user_id).collect();
    let users = repo
        .list_users(&UserFilter::default())
        .await?
        .into_iter()
        .filter(|u| with_slots.contains(&u.user_id))
        .collect();
    Ok(AvailabilityData { slots, users })
}

/// Fetch heatmap aggregates, restricted to the inclusive range when both
/// bounds are given.
pub async fn fetch_heatmap(
    repo: &dyn FullRepository,
    start_slot: Option<i64>,
    end_slot: Option<i64>,
) -> RepositoryResult<HeatmapData> {
    let aggregates = repo
        .fetch_aggregates(start_slot.map(SlotIndex::new), end_slot.map(SlotIndex::new))
        .await?;
    Ok(HeatmapData { aggregates })
}

/// Rebuild all aggregate rows from the slot store (maintenance operation).
pub async fn rebuild_aggregates(repo: &dyn FullRepository) -> RepositoryResult<usize> {
    let rebuilt = repo.rebuild_aggregates().await?;
    log::info!("rebuilt {} aggregate slot counts", rebuilt);
    Ok(rebuilt)
}

/// Repository health probe.
pub async fn health_check(repo: &dyn FullRepository) -> RepositoryResult<bool> {
    repo.health_check().await
}

// =============================================================================
// Roster
// =============================================================================

pub async fn create_user(repo: &dyn FullRepository, new_user: &NewUser) -> RepositoryResult<User> {
    repo.create_user(new_user).await
}

pub async fn get_profile(repo: &dyn FullRepository, user_id: UserId) -> RepositoryResult<User> {
    repo.get_user(user_id).await
}

pub async fn update_profile(
    repo: &dyn FullRepository,
    user_id: UserId,
    update: &ProfileUpdate,
) -> RepositoryResult<User> {
    repo.update_profile(user_id, update).await
}

pub async fn list_users(
    repo: &dyn FullRepository,
    filter: &UserFilter,
) -> RepositoryResult<Vec<User>> {
    repo.list_users(filter).await
}

// =============================================================================
// Groups
// =============================================================================

/// Create a group led by `leader_id` and return its resolved view.
pub async fn create_group(
    repo: &dyn FullRepository,
    leader_id: UserId,
    name: &str,
) -> RepositoryResult<GroupView> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RepositoryError::validation("Group name is required"));
    }
    if name.len() > MAX_GROUP_NAME_LEN {
        return Err(RepositoryError::validation(format!(
            "Group name must be at most {} characters",
            MAX_GROUP_NAME_LEN
        )));
    }

    let group = repo.create_group(name, leader_id).await?;
    build_group_view(repo, group).await
}

pub async fn get_group(repo: &dyn FullRepository, group_id: GroupId) -> RepositoryResult<Group> {
    repo.get_group(group_id).await
}

pub async fn group_view(
    repo: &dyn FullRepository,
    group_id: GroupId,
) -> RepositoryResult<GroupView> {
    let group = repo.get_group(group_id).await?;
    build_group_view(repo, group).await
}

pub async fn groups_for_user(
    repo: &dyn FullRepository,
    user_id: UserId,
) -> RepositoryResult<Vec<GroupView>> {
    let groups = repo.groups_for_user(user_id).await?;
    let mut views = Vec::with_capacity(groups.len());
    for group in groups {
        views.push(build_group_view(repo, group).await?);
    }
    Ok(views)
}

pub async fn is_member(
    repo: &dyn FullRepository,
    group_id: GroupId,
    user_id: UserId,
) -> RepositoryResult<bool> {
    repo.is_member(group_id, user_id).await
}

/// Users who can still be invited to a group: not members, no pending invite.
pub async fn invitable_users(
    repo: &dyn FullRepository,
    group_id: GroupId,
) -> RepositoryResult<Vec<User>> {
    let members: HashSet<UserId> = repo
        .group_members(group_id)
        .await?
        .into_iter()
        .map(|m| m.user_id)
        .collect();
    let pending: HashSet<UserId> = repo
        .pending_invites_for_group(group_id)
        .await?
        .into_iter()
        .map(|i| i.invitee_id)
        .collect();

    let users = repo
        .list_users(&UserFilter::default())
        .await?
        .into_iter()
        .filter(|u| !members.contains(&u.user_id) && !pending.contains(&u.user_id))
        .collect();
    Ok(users)
}

/// Invite a user to a group. The leader-only rule is enforced at the HTTP
/// boundary; this checks the data rules: the group must have room, the
/// invitee must exist, must not already be a member, and must not already
/// have a pending invite.
pub async fn invite_user(
    repo: &dyn FullRepository,
    group_id: GroupId,
    inviter_id: UserId,
    invitee_id: UserId,
) -> RepositoryResult<InviteView> {
    let group = repo.get_group(group_id).await?;

    let member_count = repo.group_members(group_id).await?.len();
    if member_count >= group.max_size as usize {
        return Err(RepositoryError::validation(format!(
            "Group is full ({}/{} members)",
            member_count, group.max_size
        )));
    }

    repo.get_user(invitee_id).await?;

    if repo.is_member(group_id, invitee_id).await? {
        return Err(RepositoryError::validation(
            "User is already a member of this group",
        ));
    }

    let invite = repo.create_invite(group_id, inviter_id, invitee_id).await?;
    Ok(build_invite_view(repo, invite).await)
}

/// Accept an invite addressed to `invitee_id` for `group_id`.
///
/// The invitee-match rule is re-verified here and inside the repository
/// transaction; the URL's group id must agree with the invite.
pub async fn accept_invite(
    repo: &dyn FullRepository,
    group_id: GroupId,
    invite_id: InviteId,
    invitee_id: UserId,
) -> RepositoryResult<GroupView> {
    let invite = repo.get_invite(invite_id).await?;
    if invite.group_id != group_id {
        return Err(RepositoryError::validation("Invite does not match group"));
    }

    let group = repo.accept_invite(invite_id, invitee_id).await?;
    build_group_view(repo, group).await
}

/// Decline a pending invite addressed to `invitee_id`.
pub async fn decline_invite(
    repo: &dyn FullRepository,
    group_id: GroupId,
    invite_id: InviteId,
    invitee_id: UserId,
) -> RepositoryResult<()> {
    let invite = repo.get_invite(invite_id).await?;
    if invite.group_id != group_id {
        return Err(RepositoryError::validation("Invite does not match group"));
    }
    repo.decline_invite(invite_id, invitee_id).await
}

/// Leave a group, promoting the earliest remaining joiner when the leader
/// departs. Returns the group so callers can name it in their response.
pub async fn leave_group(
    repo: &dyn FullRepository,
    group_id: GroupId,
    user_id: UserId,
) -> RepositoryResult<Group> {
    let group = repo.get_group(group_id).await?;
    repo.leave_group(group_id, user_id).await?;
    Ok(group)
}

/// Disband a group. The caller must echo the exact group name; the
/// leader-only rule is enforced at the HTTP boundary.
pub async fn disband_group(
    repo: &dyn FullRepository,
    group_id: GroupId,
    confirmed_name: &str,
) -> RepositoryResult<Group> {
    let group = repo.get_group(group_id).await?;
    if confirmed_name != group.name {
        return Err(RepositoryError::validation("Group name does not match"));
    }
    repo.disband_group(group_id).await?;
    Ok(group)
}

/// A user's visible pending invites, lazily expiring stale ones first.
pub async fn pending_invitations(
    repo: &dyn FullRepository,
    user_id: UserId,
) -> RepositoryResult<Vec<InviteView>> {
    let now = Utc::now();
    let expired = repo
        .expire_invites_before(now - Duration::days(INVITE_EXPIRY_DAYS))
        .await?;
    if expired > 0 {
        log::debug!("expired {} stale invites", expired);
    }

    let invites = repo
        .pending_invites_for_user(user_id, now - Duration::days(INVITE_VISIBLE_DAYS))
        .await?;
    let mut views = Vec::with_capacity(invites.len());
    for invite in invites {
        views.push(build_invite_view(repo, invite).await);
    }
    Ok(views)
}

// =============================================================================
// View builders
// =============================================================================

async fn build_group_view(
    repo: &dyn FullRepository,
    group: Group,
) -> RepositoryResult<GroupView> {
    let members = repo.group_members(group.group_id).await?;

    let mut member_views = Vec::with_capacity(members.len());
    for member in &members {
        // Dangling user references degrade to bare ids
        let user = repo.find_user(member.user_id).await?;
        member_views.push(GroupMemberView {
            user_id: member.user_id,
            user_name: user.as_ref().map(|u| u.character_name.clone()),
            user_class: user.as_ref().map(|u| u.character_class.clone()),
            user_roles: user.map(|u| u.roles).unwrap_or_default(),
            joined_at: member.joined_at,
        });
    }

    let leader_name = repo
        .find_user(group.leader_id)
        .await?
        .map(|u| u.character_name);

    Ok(GroupView {
        group_id: group.group_id,
        name: group.name,
        leader_id: group.leader_id,
        leader_name,
        created_at: group.created_at,
        max_size: group.max_size,
        member_count: members.len(),
        is_full: members.len() >= group.max_size as usize,
        members: member_views,
    })
}

async fn build_invite_view(repo: &dyn FullRepository, invite: GroupInvite) -> InviteView {
    let group_name = repo
        .get_group(invite.group_id)
        .await
        .ok()
        .map(|g| g.name);
    let inviter_name = repo
        .find_user(invite.inviter_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.character_name);
    let invitee_name = repo
        .find_user(invite.invitee_id)
        .await
        .ok()
        .flatten()
        .map(|u| u.character_name);

    InviteView {
        invite_id: invite.invite_id,
        group_id: invite.group_id,
        group_name,
        inviter_id: invite.inviter_id,
        inviter_name,
        invitee_id: invite.invitee_id,
        invitee_name,
        status: invite.status,
        created_at: invite.created_at,
        responded_at: invite.responded_at,
    }
}
