//! Integration tests crossing the routes, services, and repository layers.

use gat_rust::api::UserId;
use gat_rust::db::repositories::LocalRepository;
use gat_rust::db::repository::UserRepository;
use gat_rust::db::services;
use gat_rust::models::{NewUser, SlotEntry};
use gat_rust::routes;

async fn seed_user(repo: &LocalRepository, name: &str, class: &str) -> UserId {
    repo.create_user(&NewUser {
        character_name: name.to_string(),
        character_class: class.to_string(),
        roles: vec![],
        timezone: None,
    })
    .await
    .unwrap()
    .user_id
}

#[tokio::test]
async fn test_availability_round_trip() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick", "warrior").await;

    let outcome = services::bulk_set_slots(
        &repo,
        user,
        &[
            SlotEntry { slot_index: 10, state: 2 },
            SlotEntry { slot_index: 11, state: 1 },
        ],
    )
    .await
    .unwrap();
    assert_eq!(outcome.applied, 2);

    let params = services::AvailabilityQueryParams {
        start_slot: Some(10),
        end_slot: Some(11),
        user_id: Some(user),
        ..Default::default()
    };
    let data = services::query_availability(&repo, &params).await.unwrap();
    assert_eq!(data.slots.len(), 2);
    assert_eq!(data.users.len(), 1);

    let heatmap = services::fetch_heatmap(&repo, Some(10), Some(11)).await.unwrap();
    assert_eq!(heatmap.aggregates.len(), 2);
    assert_eq!(heatmap.aggregates[0].available_count, 1);
    assert_eq!(heatmap.aggregates[1].maybe_count, 1);
}

#[tokio::test]
async fn test_matching_over_seeded_guild() {
    let repo = LocalRepository::new();
    let caller = seed_user(&repo, "Thornwick", "warrior").await;
    let healer = seed_user(&repo, "Lumen", "priest").await;

    for slot in [100, 101, 102] {
        services::set_slot(&repo, caller, slot, 2).await.unwrap();
    }
    for slot in [101, 102, 103] {
        services::set_slot(&repo, healer, slot, 2).await.unwrap();
    }

    let data = gat_rust::services::compute_matches(&repo, caller, 100, 103)
        .await
        .unwrap();
    assert_eq!(data.matches.len(), 1);
    assert_eq!(data.matches[0].character_name, "Lumen");
    assert_eq!(data.matches[0].character_class, "priest");
    assert_eq!(data.matches[0].overlap, 2);
    assert_eq!(data.matches[0].overlap_percent, 66.7);
}

#[tokio::test]
async fn test_group_schedule_over_workflow() {
    let repo = LocalRepository::new();
    let leader = seed_user(&repo, "Thornwick", "warrior").await;
    let member = seed_user(&repo, "Mira", "mage").await;

    let group = services::create_group(&repo, leader, "Dungeon Crew").await.unwrap();
    let invite = services::invite_user(&repo, group.group_id, leader, member)
        .await
        .unwrap();
    services::accept_invite(&repo, group.group_id, invite.invite_id, member)
        .await
        .unwrap();

    services::set_slot(&repo, leader, 50, 2).await.unwrap();
    services::set_slot(&repo, member, 50, 2).await.unwrap();

    let data = gat_rust::services::group_schedule_data(&repo, group.group_id, 40, 60)
        .await
        .unwrap();
    assert_eq!(data.slots.len(), 1);
    assert_eq!(data.slots[0].available_count, 2);
    assert_eq!(data.slots[0].total_members, 2);
}

#[test]
fn test_routes_module_exists() {
    // Ensure routes module compiles and exports expected constants
    assert_eq!(
        routes::availability::GET_AVAILABILITY_DATA,
        "get_availability_data"
    );
    assert_eq!(
        routes::availability::BULK_UPDATE_AVAILABILITY,
        "bulk_update_availability"
    );
    assert_eq!(routes::heatmap::GET_HEATMAP_DATA, "get_heatmap_data");
    assert_eq!(routes::matching::GET_MATCH_DATA, "get_match_data");
    assert_eq!(
        routes::groups::GET_GROUP_SCHEDULE_DATA,
        "get_group_schedule_data"
    );
}

#[test]
fn test_match_candidate_serializes() {
    let candidate = routes::matching::MatchCandidate {
        user_id: UserId::new(7),
        character_name: "Mira".to_string(),
        character_class: "mage".to_string(),
        overlap: 3,
        overlap_percent: 75.0,
    };
    let json = serde_json::to_string(&candidate).unwrap();
    assert!(json.contains("\"user_id\":7"));
    assert!(json.contains("\"overlap\":3"));
}

#[cfg(feature = "http-server")]
mod http_layer {
    use super::*;
    use gat_rust::http::{create_router, AppState};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_router_builds_with_local_repository() {
        let repo = Arc::new(LocalRepository::new())
            as Arc<dyn gat_rust::db::repository::FullRepository>;
        let state = AppState::new(repo);
        let _router = create_router(state);
    }
}
