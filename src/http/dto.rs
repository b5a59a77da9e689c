//! Data Transfer Objects for the HTTP API.
//!
//! These DTOs are used for request/response serialization in the REST API.
//! Most response payloads are re-exported from the routes module since they
//! already derive Serialize/Deserialize.

use serde::{Deserialize, Serialize};

// Re-export existing DTOs that are already serializable
pub use crate::api::{
    // Availability
    AvailabilityData, BulkUpdateOutcome,
    // Groups
    GroupMemberView, GroupScheduleData, GroupScheduleSlot, GroupView, InviteView,
    // Heatmap
    HeatmapData,
    // Matching
    MatchCandidate, MatchData,
};
use crate::models::{Confidence, SlotEntry, User};

/// Query parameters for the availability endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub start_slot: Option<i64>,
    #[serde(default)]
    pub end_slot: Option<i64>,
    /// Numeric user id or the literal `current`
    #[serde(default)]
    pub user_id: Option<String>,
    /// Exact class filter
    #[serde(default, rename = "class")]
    pub character_class: Option<String>,
    /// Role membership filter
    #[serde(default)]
    pub role: Option<String>,
    /// Confidence threshold: `all`, `available`, or `available_maybe`
    #[serde(default)]
    pub confidence: Option<Confidence>,
}

/// Request body for setting a single slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSlotRequest {
    pub slot_index: i64,
    pub state: i32,
}

/// Request body for the bulk availability write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    pub slots: Vec<SlotEntry>,
}

/// Response for the bulk availability write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkUpdateResponse {
    pub success: bool,
    pub applied: usize,
    pub skipped: usize,
}

/// Inclusive slot range query (both bounds optional).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SlotRangeQuery {
    #[serde(default)]
    pub start_slot: Option<i64>,
    #[serde(default)]
    pub end_slot: Option<i64>,
}

/// Response for the aggregate rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildResponse {
    pub success: bool,
    pub slots_rebuilt: usize,
}

/// Generic success/message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleResponse {
    pub success: bool,
    pub message: String,
}

/// Query parameters for the roster listing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserListQuery {
    #[serde(default, rename = "class")]
    pub character_class: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Roster listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub total: usize,
}

/// Request body for creating a roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub character_name: String,
    #[serde(rename = "class")]
    pub character_class: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Request body for the profile update.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateProfileRequest {
    #[serde(default, rename = "class")]
    pub character_class: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Response for the profile update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProfileResponse {
    pub success: bool,
    pub user: User,
}

/// Request body for group creation. Names are caller-supplied; generation is
/// out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

/// Response wrapping a group view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResponse {
    pub success: bool,
    pub group: GroupView,
}

/// Caller's group listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListResponse {
    pub groups: Vec<GroupView>,
    pub total: usize,
}

/// Request body for inviting a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteRequest {
    pub user_id: i64,
}

/// Response wrapping an invite view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteResponse {
    pub success: bool,
    pub invite: InviteView,
}

/// Request body for disbanding a group: the caller must echo the exact name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisbandRequest {
    #[serde(default)]
    pub name: String,
}

/// Pending invitations listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInvitesResponse {
    pub invites: Vec<InviteView>,
    pub count: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}
