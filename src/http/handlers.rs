//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the service
//! layer for business logic. Caller-dependent permission rules (leader-only,
//! invitee-only, member-only, admin-only) are enforced here, mirroring the
//! service boundary: data-integrity rules live in `db::services`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::dto::{
    AvailabilityQuery, BulkUpdateRequest, BulkUpdateResponse, CreateGroupRequest,
    CreateUserRequest, DisbandRequest, GroupListResponse, GroupResponse, HealthResponse,
    InviteRequest, InviteResponse, PendingInvitesResponse, RebuildResponse, SetSlotRequest,
    SimpleResponse, SlotRangeQuery, UpdateProfileRequest, UpdateProfileResponse, UserListQuery,
    UserListResponse,
};
use super::error::AppError;
use super::identity::CurrentUser;
use super::state::AppState;
use crate::api::{GroupId, InviteId, UserId};
use crate::db::repository::{GroupRepository, UserRepository};
use crate::db::services as db_services;
use crate::models::{NewUser, ProfileUpdate, User, UserFilter};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Resolve the caller to a roster entry, rejecting identities the roster
/// doesn't know.
async fn require_user(state: &AppState, user_id: UserId) -> Result<User, AppError> {
    state
        .repository
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(format!("Unknown user {}", user_id)))
}

/// Extract a required inclusive slot range from a query.
fn require_range(query: &SlotRangeQuery) -> Result<(i64, i64), AppError> {
    match (query.start_slot, query.end_slot) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::BadRequest(
            "start_slot and end_slot are required".to_string(),
        )),
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and database is
/// accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Availability
// =============================================================================

/// GET /v1/availability
///
/// Availability query with slot-range, user, class/role, and confidence
/// filters. `user_id=current` resolves to the caller.
pub async fn get_availability(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<AvailabilityQuery>,
) -> HandlerResult<crate::api::AvailabilityData> {
    let user_id = match query.user_id.as_deref() {
        None | Some("") => None,
        Some("current") => Some(caller.id()),
        Some(raw) => Some(UserId::new(raw.parse::<i64>().map_err(|_| {
            AppError::BadRequest(format!("Invalid user_id: {}", raw))
        })?)),
    };

    let params = db_services::AvailabilityQueryParams {
        start_slot: query.start_slot,
        end_slot: query.end_slot,
        user_id,
        character_class: query.character_class,
        role: query.role,
        confidence: query.confidence.unwrap_or_default(),
    };
    let data = db_services::query_availability(state.repository.as_ref(), &params).await?;
    Ok(Json(data))
}

/// POST /v1/availability/slots
///
/// Set a single slot for the caller. Invalid states are rejected.
pub async fn set_availability_slot(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<SetSlotRequest>,
) -> HandlerResult<SimpleResponse> {
    let user = require_user(&state, caller.id()).await?;
    db_services::set_slot(
        state.repository.as_ref(),
        user.user_id,
        request.slot_index,
        request.state,
    )
    .await?;

    Ok(Json(SimpleResponse {
        success: true,
        message: "Slot updated".to_string(),
    }))
}

/// POST /v1/availability/bulk
///
/// Bulk update availability slots for the caller. Entries with invalid states
/// are skipped; the rest commit as one transaction.
pub async fn bulk_update_availability(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<BulkUpdateRequest>,
) -> HandlerResult<BulkUpdateResponse> {
    let user = require_user(&state, caller.id()).await?;
    let outcome =
        db_services::bulk_set_slots(state.repository.as_ref(), user.user_id, &request.slots)
            .await?;

    Ok(Json(BulkUpdateResponse {
        success: true,
        applied: outcome.applied,
        skipped: outcome.skipped,
    }))
}

/// GET /v1/availability/aggregate
///
/// Heatmap aggregates (read-only), optionally restricted to an inclusive slot
/// range.
pub async fn get_aggregate(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Query(query): Query<SlotRangeQuery>,
) -> HandlerResult<crate::api::HeatmapData> {
    let data =
        db_services::fetch_heatmap(state.repository.as_ref(), query.start_slot, query.end_slot)
            .await?;
    Ok(Json(data))
}

/// POST /v1/availability/aggregate/rebuild
///
/// Rebuild all aggregate rows from the slot store. Admin-only.
pub async fn rebuild_aggregates(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> HandlerResult<RebuildResponse> {
    let user = require_user(&state, caller.id()).await?;
    if !user.is_admin {
        return Err(AppError::Forbidden(
            "Admin privileges required".to_string(),
        ));
    }

    let slots_rebuilt = db_services::rebuild_aggregates(state.repository.as_ref()).await?;
    Ok(Json(RebuildResponse {
        success: true,
        slots_rebuilt,
    }))
}

/// GET /v1/availability/matches
///
/// Rank other users by Available-slot overlap with the caller over a required
/// slot range.
pub async fn get_matches(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<SlotRangeQuery>,
) -> HandlerResult<crate::api::MatchData> {
    let (start_slot, end_slot) = require_range(&query)?;
    let data = crate::services::compute_matches(
        state.repository.as_ref(),
        caller.id(),
        start_slot,
        end_slot,
    )
    .await?;
    Ok(Json(data))
}

// =============================================================================
// Roster
// =============================================================================

/// GET /v1/users
///
/// Roster listing with optional class/role filters.
pub async fn list_users(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Query(query): Query<UserListQuery>,
) -> HandlerResult<UserListResponse> {
    let filter = UserFilter {
        character_class: query.character_class,
        role: query.role,
    };
    let users = db_services::list_users(state.repository.as_ref(), &filter).await?;
    let total = users.len();
    Ok(Json(UserListResponse { users, total }))
}

/// POST /v1/users
///
/// Create a roster entry (registration happens upstream; this records the
/// character).
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = db_services::create_user(
        state.repository.as_ref(),
        &NewUser {
            character_name: request.character_name,
            character_class: request.character_class,
            roles: request.roles,
            timezone: request.timezone,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /v1/users/me
///
/// The caller's profile.
pub async fn get_me(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> HandlerResult<User> {
    let user = require_user(&state, caller.id()).await?;
    Ok(Json(user))
}

/// PUT /v1/users/me
///
/// Update the caller's profile (class, roles, timezone).
pub async fn update_me(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<UpdateProfileRequest>,
) -> HandlerResult<UpdateProfileResponse> {
    let user = require_user(&state, caller.id()).await?;
    let updated = db_services::update_profile(
        state.repository.as_ref(),
        user.user_id,
        &ProfileUpdate {
            character_class: request.character_class,
            roles: request.roles,
            timezone: request.timezone,
        },
    )
    .await?;

    Ok(Json(UpdateProfileResponse {
        success: true,
        user: updated,
    }))
}

// =============================================================================
// Groups
// =============================================================================

/// POST /v1/groups
///
/// Create a group led by the caller, who becomes its first member.
pub async fn create_group(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), AppError> {
    let user = require_user(&state, caller.id()).await?;
    let group =
        db_services::create_group(state.repository.as_ref(), user.user_id, &request.name).await?;

    Ok((
        StatusCode::CREATED,
        Json(GroupResponse {
            success: true,
            group,
        }),
    ))
}

/// GET /v1/groups
///
/// The caller's groups.
pub async fn list_my_groups(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> HandlerResult<GroupListResponse> {
    let groups = db_services::groups_for_user(state.repository.as_ref(), caller.id()).await?;
    let total = groups.len();
    Ok(Json(GroupListResponse { groups, total }))
}

/// GET /v1/groups/{group_id}
///
/// Group detail with members. Member-only.
pub async fn get_group(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
) -> HandlerResult<crate::api::GroupView> {
    let group_id = GroupId::new(group_id);
    db_services::get_group(state.repository.as_ref(), group_id).await?;
    if !db_services::is_member(state.repository.as_ref(), group_id, caller.id()).await? {
        return Err(AppError::Forbidden(
            "You are not a member of this group".to_string(),
        ));
    }
    let view = db_services::group_view(state.repository.as_ref(), group_id).await?;
    Ok(Json(view))
}

/// GET /v1/groups/{group_id}/invitable
///
/// Users who can still be invited: not members, no pending invite.
/// Member-only.
pub async fn get_invitable_users(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
) -> HandlerResult<UserListResponse> {
    let group_id = GroupId::new(group_id);
    db_services::get_group(state.repository.as_ref(), group_id).await?;
    if !db_services::is_member(state.repository.as_ref(), group_id, caller.id()).await? {
        return Err(AppError::Forbidden(
            "You are not a member of this group".to_string(),
        ));
    }

    let users = db_services::invitable_users(state.repository.as_ref(), group_id).await?;
    let total = users.len();
    Ok(Json(UserListResponse { users, total }))
}

/// POST /v1/groups/{group_id}/invite
///
/// Invite a user to the group. Leader-only.
pub async fn invite_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
    Json(request): Json<InviteRequest>,
) -> Result<(StatusCode, Json<InviteResponse>), AppError> {
    let group_id = GroupId::new(group_id);
    let group = db_services::get_group(state.repository.as_ref(), group_id).await?;
    if group.leader_id != caller.id() {
        return Err(AppError::Forbidden(
            "Only the group leader can send invites".to_string(),
        ));
    }

    let invite = db_services::invite_user(
        state.repository.as_ref(),
        group_id,
        caller.id(),
        UserId::new(request.user_id),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(InviteResponse {
            success: true,
            invite,
        }),
    ))
}

/// POST /v1/groups/{group_id}/invites/{invite_id}/accept
///
/// Accept an invitation addressed to the caller.
pub async fn accept_invite(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((group_id, invite_id)): Path<(i64, i64)>,
) -> HandlerResult<GroupResponse> {
    let group_id = GroupId::new(group_id);
    let invite_id = InviteId::new(invite_id);

    let invite = state.repository.get_invite(invite_id).await?;
    if invite.invitee_id != caller.id() {
        return Err(AppError::Forbidden(
            "This invite is not for you".to_string(),
        ));
    }

    let group =
        db_services::accept_invite(state.repository.as_ref(), group_id, invite_id, caller.id())
            .await?;

    Ok(Json(GroupResponse {
        success: true,
        group,
    }))
}

/// POST /v1/groups/{group_id}/invites/{invite_id}/decline
///
/// Decline an invitation addressed to the caller.
pub async fn decline_invite(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((group_id, invite_id)): Path<(i64, i64)>,
) -> HandlerResult<SimpleResponse> {
    let group_id = GroupId::new(group_id);
    let invite_id = InviteId::new(invite_id);

    let invite = state.repository.get_invite(invite_id).await?;
    if invite.invitee_id != caller.id() {
        return Err(AppError::Forbidden(
            "This invite is not for you".to_string(),
        ));
    }

    db_services::decline_invite(state.repository.as_ref(), group_id, invite_id, caller.id())
        .await?;

    Ok(Json(SimpleResponse {
        success: true,
        message: "Invite declined".to_string(),
    }))
}

/// DELETE /v1/groups/{group_id}/leave
///
/// Leave a group; a departing leader hands off to the earliest joiner.
pub async fn leave_group(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
) -> HandlerResult<SimpleResponse> {
    let group = db_services::leave_group(
        state.repository.as_ref(),
        GroupId::new(group_id),
        caller.id(),
    )
    .await?;

    Ok(Json(SimpleResponse {
        success: true,
        message: format!("You left {}", group.name),
    }))
}

/// DELETE /v1/groups/{group_id}
///
/// Disband a group. Leader-only; the body must echo the exact group name.
pub async fn disband_group(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
    Json(request): Json<DisbandRequest>,
) -> HandlerResult<SimpleResponse> {
    let group_id = GroupId::new(group_id);
    let group = db_services::get_group(state.repository.as_ref(), group_id).await?;
    if group.leader_id != caller.id() {
        return Err(AppError::Forbidden(
            "Only the group leader can disband the group".to_string(),
        ));
    }

    let group =
        db_services::disband_group(state.repository.as_ref(), group_id, &request.name).await?;

    Ok(Json(SimpleResponse {
        success: true,
        message: format!("{} has been disbanded", group.name),
    }))
}

/// GET /v1/groups/{group_id}/schedule-data
///
/// Per-slot member availability pivot over a required range. Member-only.
pub async fn get_group_schedule_data(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(group_id): Path<i64>,
    Query(query): Query<SlotRangeQuery>,
) -> HandlerResult<crate::api::GroupScheduleData> {
    let group_id = GroupId::new(group_id);
    db_services::get_group(state.repository.as_ref(), group_id).await?;
    if !db_services::is_member(state.repository.as_ref(), group_id, caller.id()).await? {
        return Err(AppError::Forbidden(
            "You are not a member of this group".to_string(),
        ));
    }

    let (start_slot, end_slot) = require_range(&query)?;
    let data = crate::services::group_schedule_data(
        state.repository.as_ref(),
        group_id,
        start_slot,
        end_slot,
    )
    .await?;
    Ok(Json(data))
}

/// GET /v1/invitations/pending
///
/// The caller's pending invitations (stale ones are expired lazily).
pub async fn get_pending_invitations(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> HandlerResult<PendingInvitesResponse> {
    let invites =
        db_services::pending_invitations(state.repository.as_ref(), caller.id()).await?;
    let count = invites.len();
    Ok(Json(PendingInvitesResponse { invites, count }))
}
