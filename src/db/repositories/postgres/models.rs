use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

use super::schema::{
    aggregate_slot_counts, availability_slots, group_invites, group_memberships, groups, users,
};
use crate::api::{GroupId, InviteId, UserId};
use crate::models::{
    AggregateSlotCount, AvailabilitySlot, Group, GroupInvite, GroupMember, InviteStatus,
    SlotIndex, SlotState, User,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub user_id: i64,
    pub character_name: String,
    pub character_class: String,
    pub roles_json: Value,
    pub timezone: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            user_id: UserId::new(row.user_id),
            character_name: row.character_name,
            character_class: row.character_class,
            // Malformed role payloads degrade to an empty role list
            roles: serde_json::from_value(row.roles_json).unwrap_or_default(),
            timezone: row.timezone,
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub character_name: String,
    pub character_class: String,
    pub roles_json: Value,
    pub timezone: Option<String>,
}

/// Partial profile update; `None` fields are left untouched by Diesel.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = users)]
pub struct ProfileChangeset {
    pub character_class: Option<String>,
    pub roles_json: Option<Value>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = availability_slots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AvailabilitySlotRow {
    #[allow(dead_code)] // surrogate key, not part of the domain type
    pub slot_id: i64,
    pub user_id: i64,
    pub slot_index: i64,
    pub state: i16,
    pub updated_at: DateTime<Utc>,
}

impl AvailabilitySlotRow {
    pub fn into_domain(self) -> Option<AvailabilitySlot> {
        // Rows only ever hold whitelisted states; anything else is skipped
        let state = SlotState::from_raw(self.state as i32)?;
        Some(AvailabilitySlot {
            user_id: UserId::new(self.user_id),
            slot_index: SlotIndex::new(self.slot_index),
            state,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = availability_slots)]
pub struct NewAvailabilitySlotRow {
    pub user_id: i64,
    pub slot_index: i64,
    pub state: i16,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = aggregate_slot_counts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AggregateSlotCountRow {
    pub slot_index: i64,
    pub available_count: i32,
    pub maybe_count: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<AggregateSlotCountRow> for AggregateSlotCount {
    fn from(row: AggregateSlotCountRow) -> Self {
        AggregateSlotCount {
            slot_index: SlotIndex::new(row.slot_index),
            available_count: row.available_count,
            maybe_count: row.maybe_count,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = aggregate_slot_counts)]
pub struct NewAggregateSlotCountRow {
    pub slot_index: i64,
    pub available_count: i32,
    pub maybe_count: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupRow {
    pub group_id: i64,
    pub name: String,
    pub leader_id: i64,
    pub max_size: i32,
    pub created_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            group_id: GroupId::new(row.group_id),
            name: row.name,
            leader_id: UserId::new(row.leader_id),
            max_size: row.max_size,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroupRow {
    pub name: String,
    pub leader_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = group_memberships)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupMembershipRow {
    #[allow(dead_code)] // surrogate key, not part of the domain type
    pub membership_id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
}

impl From<GroupMembershipRow> for GroupMember {
    fn from(row: GroupMembershipRow) -> Self {
        GroupMember {
            group_id: GroupId::new(row.group_id),
            user_id: UserId::new(row.user_id),
            joined_at: row.joined_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = group_memberships)]
pub struct NewGroupMembershipRow {
    pub group_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = group_invites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct GroupInviteRow {
    pub invite_id: i64,
    pub group_id: i64,
    pub inviter_id: i64,
    pub invitee_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<GroupInviteRow> for GroupInvite {
    fn from(row: GroupInviteRow) -> Self {
        GroupInvite {
            invite_id: InviteId::new(row.invite_id),
            group_id: GroupId::new(row.group_id),
            inviter_id: UserId::new(row.inviter_id),
            invitee_id: UserId::new(row.invitee_id),
            status: InviteStatus::parse(&row.status).unwrap_or(InviteStatus::Expired),
            created_at: row.created_at,
            responded_at: row.responded_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = group_invites)]
pub struct NewGroupInviteRow {
    pub group_id: i64,
    pub inviter_id: i64,
    pub invitee_id: i64,
    pub status: String,
}
