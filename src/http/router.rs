//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration - permissive for development, should be restricted in production
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the API router with versioned endpoints
    let api_v1 = Router::new()
        // Availability
        .route("/availability", get(handlers::get_availability))
        .route("/availability/slots", post(handlers::set_availability_slot))
        .route("/availability/bulk", post(handlers::bulk_update_availability))
        .route("/availability/aggregate", get(handlers::get_aggregate))
        .route("/availability/aggregate/rebuild", post(handlers::rebuild_aggregates))
        .route("/availability/matches", get(handlers::get_matches))
        // Roster
        .route("/users", get(handlers::list_users))
        .route("/users", post(handlers::create_user))
        .route("/users/me", get(handlers::get_me))
        .route("/users/me", put(handlers::update_me))
        // Groups
        .route("/groups", post(handlers::create_group))
        .route("/groups", get(handlers::list_my_groups))
        .route("/groups/{group_id}", get(handlers::get_group))
        .route("/groups/{group_id}", delete(handlers::disband_group))
        .route("/groups/{group_id}/invitable", get(handlers::get_invitable_users))
        .route("/groups/{group_id}/invite", post(handlers::invite_user))
        .route("/groups/{group_id}/invites/{invite_id}/accept", post(handlers::accept_invite))
        .route("/groups/{group_id}/invites/{invite_id}/decline", post(handlers::decline_invite))
        .route("/groups/{group_id}/leave", delete(handlers::leave_group))
        .route("/groups/{group_id}/schedule-data", get(handlers::get_group_schedule_data))
        .route("/invitations/pending", get(handlers::get_pending_invitations));

    // Combine all routes
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use std::sync::Arc;

    #[test]
    fn test_router_creation() {
        let repo = Arc::new(LocalRepository::new())
            as Arc<dyn crate::db::repository::FullRepository>;
        let state = AppState::new(repo);
        let _router = create_router(state);
        // If we got here, router was created successfully
    }
}
