//! Repository-level tests for the in-memory backend, including the
//! concurrent-writer behavior of the aggregate maintainer.

use std::sync::Arc;

use gat_rust::api::UserId;
use gat_rust::db::repositories::LocalRepository;
use gat_rust::db::repository::{AvailabilityRepository, UserRepository};
use gat_rust::models::{Confidence, NewUser, SlotFilter, SlotIndex, SlotState};

async fn seed_user(repo: &LocalRepository, name: &str) -> UserId {
    repo.create_user(&NewUser {
        character_name: name.to_string(),
        character_class: "warrior".to_string(),
        roles: vec!["dps".to_string()],
        timezone: Some("Europe/Berlin".to_string()),
    })
    .await
    .unwrap()
    .user_id
}

#[tokio::test]
async fn test_set_slot_upserts_single_row() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    repo.set_slot(user, SlotIndex::new(10), SlotState::Maybe)
        .await
        .unwrap();
    repo.set_slot(user, SlotIndex::new(10), SlotState::Available)
        .await
        .unwrap();

    let rows = repo.query_slots(&SlotFilter::new().user(user)).await.unwrap();
    assert_eq!(rows.len(), 1, "one row per (user, slot_index)");
    assert_eq!(rows[0].state, SlotState::Available);
}

#[tokio::test]
async fn test_unavailable_never_stored() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    // Setting Unavailable where no row exists stores nothing
    repo.set_slot(user, SlotIndex::new(20), SlotState::Unavailable)
        .await
        .unwrap();
    let rows = repo.query_slots(&SlotFilter::new().user(user)).await.unwrap();
    assert!(rows.is_empty());

    // No aggregate row appears either
    let aggregates = repo
        .fetch_aggregates(Some(SlotIndex::new(20)), Some(SlotIndex::new(20)))
        .await
        .unwrap();
    assert!(aggregates.is_empty());
}

#[tokio::test]
async fn test_aggregate_row_survives_at_zero() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    repo.set_slot(user, SlotIndex::new(30), SlotState::Available)
        .await
        .unwrap();
    repo.set_slot(user, SlotIndex::new(30), SlotState::Unavailable)
        .await
        .unwrap();

    // The row existed once, so it stays with zeroed counts
    let aggregates = repo
        .fetch_aggregates(Some(SlotIndex::new(30)), Some(SlotIndex::new(30)))
        .await
        .unwrap();
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].available_count, 0);
    assert_eq!(aggregates[0].maybe_count, 0);
}

#[tokio::test]
async fn test_concurrent_writers_same_slot_no_lost_update() {
    let repo = Arc::new(LocalRepository::new());
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    // Two concurrent writers, different users, same slot index
    let slot = SlotIndex::new(77);
    let repo_a = Arc::clone(&repo);
    let repo_b = Arc::clone(&repo);
    let task_a =
        tokio::spawn(async move { repo_a.set_slot(a, slot, SlotState::Available).await });
    let task_b =
        tokio::spawn(async move { repo_b.set_slot(b, slot, SlotState::Available).await });
    task_a.await.unwrap().unwrap();
    task_b.await.unwrap().unwrap();

    let aggregates = repo
        .fetch_aggregates(Some(slot), Some(slot))
        .await
        .unwrap();
    assert_eq!(aggregates.len(), 1);
    assert_eq!(
        aggregates[0].available_count, 2,
        "both committed writes must be reflected"
    );
}

#[tokio::test]
async fn test_concurrent_bulk_writers_disjoint_slots() {
    let repo = Arc::new(LocalRepository::new());
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    let entries_a: Vec<(SlotIndex, SlotState)> = (0..20)
        .map(|i| (SlotIndex::new(i), SlotState::Available))
        .collect();
    let entries_b: Vec<(SlotIndex, SlotState)> = (10..30)
        .map(|i| (SlotIndex::new(i), SlotState::Maybe))
        .collect();

    let repo_a = Arc::clone(&repo);
    let repo_b = Arc::clone(&repo);
    let task_a = tokio::spawn(async move { repo_a.bulk_set_slots(a, &entries_a).await });
    let task_b = tokio::spawn(async move { repo_b.bulk_set_slots(b, &entries_b).await });
    assert_eq!(task_a.await.unwrap().unwrap(), 20);
    assert_eq!(task_b.await.unwrap().unwrap(), 20);

    let aggregates = repo
        .fetch_aggregates(Some(SlotIndex::new(0)), Some(SlotIndex::new(29)))
        .await
        .unwrap();
    assert_eq!(aggregates.len(), 30);
    for aggregate in aggregates {
        let slot = aggregate.slot_index.value();
        let expected_available = i32::from(slot < 20);
        let expected_maybe = i32::from(slot >= 10);
        assert_eq!(aggregate.available_count, expected_available);
        assert_eq!(aggregate.maybe_count, expected_maybe);
    }
}

#[tokio::test]
async fn test_query_slots_filter_combinations() {
    let repo = LocalRepository::new();
    let a = seed_user(&repo, "Thornwick").await;
    let b = seed_user(&repo, "Mira").await;

    repo.set_slot(a, SlotIndex::new(100), SlotState::Available)
        .await
        .unwrap();
    repo.set_slot(a, SlotIndex::new(101), SlotState::Maybe)
        .await
        .unwrap();
    repo.set_slot(b, SlotIndex::new(100), SlotState::Maybe)
        .await
        .unwrap();
    repo.set_slot(b, SlotIndex::new(200), SlotState::Available)
        .await
        .unwrap();

    let all = repo.query_slots(&SlotFilter::new()).await.unwrap();
    assert_eq!(all.len(), 4);

    let in_range = repo
        .query_slots(&SlotFilter::new().range(SlotIndex::new(100), SlotIndex::new(101)))
        .await
        .unwrap();
    assert_eq!(in_range.len(), 3);

    let available_only = repo
        .query_slots(
            &SlotFilter::new()
                .range(SlotIndex::new(100), SlotIndex::new(200))
                .confidence(Confidence::Available),
        )
        .await
        .unwrap();
    assert_eq!(available_only.len(), 2);

    let b_only = repo
        .query_slots(&SlotFilter::new().user(b))
        .await
        .unwrap();
    assert_eq!(b_only.len(), 2);
}

#[tokio::test]
async fn test_duplicate_character_name_rejected() {
    let repo = LocalRepository::new();
    seed_user(&repo, "Thornwick").await;

    let err = repo
        .create_user(&NewUser {
            character_name: "Thornwick".to_string(),
            character_class: "priest".to_string(),
            roles: vec![],
            timezone: None,
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already taken"));
}

#[tokio::test]
async fn test_update_profile_partial() {
    let repo = LocalRepository::new();
    let user = seed_user(&repo, "Thornwick").await;

    let updated = repo
        .update_profile(
            user,
            &gat_rust::models::ProfileUpdate {
                character_class: None,
                roles: Some(vec!["tank".to_string()]),
                timezone: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.character_class, "warrior");
    assert_eq!(updated.roles, vec!["tank".to_string()]);
    assert_eq!(updated.timezone.as_deref(), Some("Europe/Berlin"));
}
