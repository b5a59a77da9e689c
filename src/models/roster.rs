//! Roster domain types: guild members, parties, and party invites.
//!
//! Authentication is handled upstream; these types carry no credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{GroupId, InviteId, UserId};

/// Default party size cap.
pub const DEFAULT_GROUP_SIZE: i32 = 5;

/// A guild member (one game character).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub character_name: String,
    pub character_class: String,
    pub roles: Vec<String>,
    pub timezone: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub character_name: String,
    pub character_class: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub character_class: Option<String>,
    pub roles: Option<Vec<String>>,
    pub timezone: Option<String>,
}

/// Roster filter for user listings.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Exact class match.
    pub character_class: Option<String>,
    /// Role membership (any user whose role list contains this value).
    pub role: Option<String>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(ref class) = self.character_class {
            if &user.character_class != class {
                return false;
            }
        }
        if let Some(ref role) = self.role {
            if !user.roles.iter().any(|r| r == role) {
                return false;
            }
        }
        true
    }
}

/// A small party of members with one leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub leader_id: UserId,
    pub max_size: i32,
    pub created_at: DateTime<Utc>,
}

/// Membership edge between a group and a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

/// Lifecycle of a group invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invitation for one user to join one group.
///
/// At most one pending invite exists per `(group, invitee)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInvite {
    pub invite_id: InviteId,
    pub group_id: GroupId,
    pub inviter_id: UserId,
    pub invitee_id: UserId,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}
