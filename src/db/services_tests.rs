//! Service-layer tests for the slot store and aggregate maintainer, run
//! against the in-memory repository.

use crate::api::UserId;
use crate::db::repositories::LocalRepository;
use crate::db::repository::{AvailabilityRepository, RepositoryError, UserRepository};
use crate::db::services;
use crate::models::{Confidence, NewUser, SlotEntry, SlotFilter, SlotIndex, SlotState};

fn new_user(name: &str) -> NewUser {
    NewUser {
        character_name: name.to_string(),
        character_class: "warrior".to_string(),
        roles: vec!["dps".to_string()],
        timezone: None,
    }
}

async fn seed_user(repo: &LocalRepository, name: &str) -> UserId {
    repo.create_user(&new_user(name)).await.unwrap().user_id
}

/// Fetch the aggregate row for one slot, if any.
async fn aggregate_at(repo: &LocalRepository, slot: i64) -> Option<(i32, i32)> {
    repo.fetch_aggregates(Some(SlotIndex::new(slot)), Some(SlotIndex::new(slot)))
        .await
        .unwrap()
        .into_iter()
        .next()
        .map(|a| (a.available_count, a.maybe_count))
}

/// Assert the aggregate row equals the live row counts at a slot — the
/// maintainer invariant, checked after every write sequence.
async fn assert_aggregate_consistent(repo: &LocalRepository, slot: i64) {
    let rows = repo
        .query_slots(&SlotFilter::new().range(SlotIndex::new(slot), SlotIndex::new(slot)))
        .await
        .unwrap();
    let live_available = rows.iter().filter(|r| r.state == SlotState::Available).count() as i32;
    let live_maybe = rows.iter().filter(|r| r.state == SlotState::Maybe).count() as i32;

    let (available, maybe) = aggregate_at(repo, slot).await.unwrap_or((0, 0));
    assert_eq!(available, live_available, "available_count diverged at slot {}", slot);
    assert_eq!(maybe, live_maybe, "maybe_count diverged at slot {}", slot);
}

#[tokio::test]
async fn test_set_then_revert_deletes_row() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    services::set_slot(&repo, user, 100, 2).await.unwrap();
    services::set_slot(&repo, user, 100, 0).await.unwrap();

    let rows = repo
        .query_slots(&SlotFilter::new().user(user))
        .await
        .unwrap();
    assert!(rows.is_empty(), "revert to Unavailable must delete the row");
    assert_eq!(aggregate_at(&repo, 100).await, Some((0, 0)));
}

#[tokio::test]
async fn test_set_slot_idempotent() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    services::set_slot(&repo, user, 50, 1).await.unwrap();
    services::set_slot(&repo, user, 50, 1).await.unwrap();

    let rows = repo
        .query_slots(&SlotFilter::new().user(user))
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, SlotState::Maybe);
    assert_eq!(aggregate_at(&repo, 50).await, Some((0, 1)));
}

#[tokio::test]
async fn test_set_slot_rejects_invalid_state() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    let err = services::set_slot(&repo, user, 10, 5).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));
}

#[tokio::test]
async fn test_aggregate_tracks_every_write() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    services::set_slot(&repo, a, 200, 2).await.unwrap();
    assert_aggregate_consistent(&repo, 200).await;
    assert_eq!(aggregate_at(&repo, 200).await, Some((1, 0)));

    services::set_slot(&repo, b, 200, 1).await.unwrap();
    assert_aggregate_consistent(&repo, 200).await;
    assert_eq!(aggregate_at(&repo, 200).await, Some((1, 1)));

    // State change, not an insert: Maybe -> Available
    services::set_slot(&repo, b, 200, 2).await.unwrap();
    assert_aggregate_consistent(&repo, 200).await;
    assert_eq!(aggregate_at(&repo, 200).await, Some((2, 0)));

    services::set_slot(&repo, a, 200, 0).await.unwrap();
    assert_aggregate_consistent(&repo, 200).await;
    assert_eq!(aggregate_at(&repo, 200).await, Some((1, 0)));
}

#[tokio::test]
async fn test_bulk_duplicate_entries_last_wins() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    services::set_slot(&repo, b, 300, 2).await.unwrap();

    // Duplicate slot indices with a final Unavailable: no stored row, and the
    // aggregate is decremented exactly once (not once per duplicate)
    let outcome = services::bulk_set_slots(
        &repo,
        a,
        &[
            SlotEntry { slot_index: 300, state: 2 },
            SlotEntry { slot_index: 300, state: 1 },
            SlotEntry { slot_index: 300, state: 0 },
        ],
    )
    .await
    .unwrap();
    assert_eq!(outcome.skipped, 0);

    let rows = repo
        .query_slots(&SlotFilter::new().user(a))
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(aggregate_at(&repo, 300).await, Some((1, 0)));
    assert_aggregate_consistent(&repo, 300).await;
}

#[tokio::test]
async fn test_bulk_skips_invalid_states() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    let outcome = services::bulk_set_slots(
        &repo,
        user,
        &[
            SlotEntry { slot_index: 10, state: 2 },
            SlotEntry { slot_index: 11, state: 9 },
            SlotEntry { slot_index: 12, state: -3 },
            SlotEntry { slot_index: 13, state: 1 },
        ],
    )
    .await
    .unwrap();

    assert_eq!(outcome.applied, 2);
    assert_eq!(outcome.skipped, 2);

    let rows = repo
        .query_slots(&SlotFilter::new().user(user))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(aggregate_at(&repo, 10).await, Some((1, 0)));
    assert_eq!(aggregate_at(&repo, 11).await, None);
    assert_eq!(aggregate_at(&repo, 13).await, Some((0, 1)));
}

#[tokio::test]
async fn test_bulk_rejects_empty_input() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    let err = services::bulk_set_slots(&repo, user, &[]).await.unwrap_err();
    assert!(matches!(err, RepositoryError::ValidationError { .. }));
}

#[tokio::test]
async fn test_bulk_recomputes_once_per_distinct_slot() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    let entries: Vec<SlotEntry> = (0..6)
        .map(|i| SlotEntry { slot_index: 400 + (i % 3), state: 2 })
        .collect();
    let outcome = services::bulk_set_slots(&repo, user, &entries).await.unwrap();

    // Second write of each duplicated index is a same-state no-op
    assert_eq!(outcome.applied, 3);
    for slot in 400..403 {
        assert_eq!(aggregate_at(&repo, slot).await, Some((1, 0)));
        assert_aggregate_consistent(&repo, slot).await;
    }
}

#[tokio::test]
async fn test_query_confidence_thresholds() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    services::set_slot(&repo, a, 500, 2).await.unwrap();
    services::set_slot(&repo, b, 500, 1).await.unwrap();

    let filter = SlotFilter::new()
        .range(SlotIndex::new(500), SlotIndex::new(500))
        .confidence(Confidence::Available);
    assert_eq!(repo.query_slots(&filter).await.unwrap().len(), 1);

    let filter = SlotFilter::new()
        .range(SlotIndex::new(500), SlotIndex::new(500))
        .confidence(Confidence::AvailableMaybe);
    assert_eq!(repo.query_slots(&filter).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_query_availability_joins_users() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let _b = seed_user(&repo, "Mira").await;

    services::set_slot(&repo, a, 600, 2).await.unwrap();

    let params = services::AvailabilityQueryParams {
        start_slot: Some(600),
        end_slot: Some(600),
        ..Default::default()
    };
    let data = services::query_availability(&repo, &params).await.unwrap();
    assert_eq!(data.slots.len(), 1);
    // Only users that actually appear in the returned slots
    assert_eq!(data.users.len(), 1);
    assert_eq!(data.users[0].user_id, a);
}

#[tokio::test]
async fn test_query_availability_class_filter() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let priest = repo
        .create_user(&NewUser {
            character_name: "Lumen".to_string(),
            character_class: "priest".to_string(),
            roles: vec!["healer".to_string()],
            timezone: None,
        })
        .await
        .unwrap()
        .user_id;

    services::set_slot(&repo, a, 700, 2).await.unwrap();
    services::set_slot(&repo, priest, 700, 2).await.unwrap();

    let params = services::AvailabilityQueryParams {
        character_class: Some("priest".to_string()),
        ..Default::default()
    };
    let data = services::query_availability(&repo, &params).await.unwrap();
    assert_eq!(data.slots.len(), 1);
    assert_eq!(data.slots[0].user_id, priest);
    assert_eq!(data.users.len(), 1);
}

#[tokio::test]
async fn test_query_availability_unknown_user_degrades() {
    let repo = LocalRepository::new();

    let params = services::AvailabilityQueryParams {
        user_id: Some(UserId::new(999)),
        ..Default::default()
    };
    let data = services::query_availability(&repo, &params).await.unwrap();
    assert!(data.slots.is_empty());
    assert!(data.users.is_empty());
}

#[tokio::test]
async fn test_rebuild_aggregates() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    services::set_slot(&repo, a, 800, 2).await.unwrap();
    services::set_slot(&repo, b, 800, 1).await.unwrap();
    services::set_slot(&repo, a, 801, 2).await.unwrap();

    let rebuilt = services::rebuild_aggregates(&repo).await.unwrap();
    assert_eq!(rebuilt, 2);
    assert_eq!(aggregate_at(&repo, 800).await, Some((1, 1)));
    assert_eq!(aggregate_at(&repo, 801).await, Some((1, 0)));
}

#[tokio::test]
async fn test_heatmap_range_fetch() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    for slot in [900, 901, 950] {
        services::set_slot(&repo, user, slot, 2).await.unwrap();
    }

    let heatmap = services::fetch_heatmap(&repo, Some(900), Some(910)).await.unwrap();
    assert_eq!(heatmap.aggregates.len(), 2);

    let heatmap = services::fetch_heatmap(&repo, None, None).await.unwrap();
    assert_eq!(heatmap.aggregates.len(), 3);
}

#[tokio::test]
async fn test_out_of_range_slot_indices_accepted() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    // Slot indices are plain integer keys; no bound checks
    services::set_slot(&repo, user, -5, 2).await.unwrap();
    services::set_slot(&repo, user, i64::MAX / 2, 2).await.unwrap();

    assert_eq!(aggregate_at(&repo, -5).await, Some((1, 0)));
}
