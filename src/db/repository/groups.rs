//! Group repository trait: parties, memberships, and the invite workflow.
//!
//! Multi-row workflow steps (create-with-leader, accept, leave) are single
//! repository operations so each implementation can commit them as one
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::RepositoryResult;
use crate::api::{GroupId, InviteId, UserId};
use crate::models::{Group, GroupInvite, GroupMember};

/// Repository trait for group and invite operations.
#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Create a group and add the leader as its first member, atomically.
    /// Group names are unique; duplicates are a validation error.
    async fn create_group(&self, name: &str, leader_id: UserId) -> RepositoryResult<Group>;

    /// Fetch a group, failing with `NotFound` when absent.
    async fn get_group(&self, group_id: GroupId) -> RepositoryResult<Group>;

    /// List the groups a user belongs to.
    async fn groups_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Group>>;

    /// List a group's memberships.
    async fn group_members(&self, group_id: GroupId) -> RepositoryResult<Vec<GroupMember>>;

    /// Membership test.
    async fn is_member(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<bool>;

    /// Record a pending invite. At most one pending invite may exist per
    /// `(group, invitee)`; duplicates are a validation error.
    async fn create_invite(
        &self,
        group_id: GroupId,
        inviter_id: UserId,
        invitee_id: UserId,
    ) -> RepositoryResult<GroupInvite>;

    /// Fetch an invite, failing with `NotFound` when absent.
    async fn get_invite(&self, invite_id: InviteId) -> RepositoryResult<GroupInvite>;

    /// Pending invites for a group (used to exclude users from invite
    /// pickers).
    async fn pending_invites_for_group(
        &self,
        group_id: GroupId,
    ) -> RepositoryResult<Vec<GroupInvite>>;

    /// A user's pending invites created at or after `created_after`, newest
    /// first.
    async fn pending_invites_for_user(
        &self,
        user_id: UserId,
        created_after: DateTime<Utc>,
    ) -> RepositoryResult<Vec<GroupInvite>>;

    /// Mark pending invites created before `cutoff` as expired.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of invites expired
    async fn expire_invites_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize>;

    /// Accept an invite: re-verifies inside the transaction that the invite
    /// is still pending, addressed to `invitee_id`, and that the group has
    /// room; then marks it accepted and inserts the membership.
    ///
    /// # Returns
    /// * `Ok(Group)` - The joined group
    async fn accept_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<Group>;

    /// Decline a pending invite addressed to `invitee_id`.
    async fn decline_invite(
        &self,
        invite_id: InviteId,
        invitee_id: UserId,
    ) -> RepositoryResult<()>;

    /// Remove a member. When the leaving member leads the group and other
    /// members remain, the member with the earliest `joined_at` is promoted
    /// to leader in the same transaction. Leaving as the last member keeps
    /// the (empty) group.
    async fn leave_group(&self, group_id: GroupId, user_id: UserId) -> RepositoryResult<()>;

    /// Delete a group along with its memberships and invites.
    async fn disband_group(&self, group_id: GroupId) -> RepositoryResult<()>;
}
