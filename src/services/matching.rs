//! Schedule matching: rank other users by how many of the caller's Available
//! slots they share.

use std::collections::{HashMap, HashSet};

use crate::api::{MatchCandidate, MatchData, UserId};
use crate::db::repository::{
    AvailabilityRepository, FullRepository, RepositoryResult, UserRepository,
};
use crate::models::{Confidence, SlotFilter, SlotIndex, User, UserFilter};

/// `overlap / reference * 100`, rounded to one decimal. Zero when the
/// reference set is empty (never divides by zero).
pub(crate) fn overlap_percent(overlap: usize, reference: usize) -> f64 {
    if reference == 0 {
        return 0.0;
    }
    (overlap as f64 * 1000.0 / reference as f64).round() / 10.0
}

/// Compute match candidates for `caller` over the inclusive slot range.
///
/// Candidates are every other user with at least one Available row whose slot
/// index falls in the caller's Available set, sorted descending by overlap
/// (ties unordered). An empty caller set yields an empty, flagged result.
/// Users missing from the roster are dropped rather than failing the query.
pub async fn compute_matches(
    repo: &dyn FullRepository,
    caller: UserId,
    start_slot: i64,
    end_slot: i64,
) -> RepositoryResult<MatchData> {
    let range = (SlotIndex::new(start_slot), SlotIndex::new(end_slot));

    let mine_filter = SlotFilter::new()
        .range(range.0, range.1)
        .user(caller)
        .confidence(Confidence::Available);
    let mine: HashSet<i64> = repo
        .query_slots(&mine_filter)
        .await?
        .iter()
        .map(|s| s.slot_index.value())
        .collect();

    if mine.is_empty() {
        return Ok(MatchData {
            matches: vec![],
            reference_slots: 0,
            reference_empty: true,
        });
    }

    let others_filter = SlotFilter::new()
        .range(range.0, range.1)
        .confidence(Confidence::Available);
    let mut overlaps: HashMap<UserId, usize> = HashMap::new();
    for slot in repo.query_slots(&others_filter).await? {
        if slot.user_id == caller {
            continue;
        }
        if mine.contains(&slot.slot_index.value()) {
            *overlaps.entry(slot.user_id).or_insert(0) += 1;
        }
    }

    let roster: HashMap<UserId, User> = repo
        .list_users(&UserFilter::default())
        .await?
        .into_iter()
        .map(|u| (u.user_id, u))
        .collect();

    let mut matches: Vec<MatchCandidate> = overlaps
        .into_iter()
        .filter_map(|(user_id, overlap)| {
            let user = roster.get(&user_id)?;
            Some(MatchCandidate {
                user_id,
                character_name: user.character_name.clone(),
                character_class: user.character_class.clone(),
                overlap,
                overlap_percent: overlap_percent(overlap, mine.len()),
            })
        })
        .collect();
    matches.sort_by(|a, b| b.overlap.cmp(&a.overlap));

    Ok(MatchData {
        matches,
        reference_slots: mine.len(),
        reference_empty: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::UserRepository;
    use crate::models::NewUser;

    async fn seed_user(repo: &LocalRepository, name: &str) -> UserId {
        repo.create_user(&NewUser {
            character_name: name.to_string(),
            character_class: "warrior".to_string(),
            roles: vec![],
            timezone: None,
        })
        .await
        .unwrap()
        .user_id
    }

    async fn set_available(repo: &LocalRepository, user: UserId, slots: &[i64]) {
        for &slot in slots {
            crate::db::services::set_slot(repo, user, slot, 2)
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_overlap_percent_rounding() {
        assert_eq!(overlap_percent(2, 3), 66.7);
        assert_eq!(overlap_percent(1, 3), 33.3);
        assert_eq!(overlap_percent(3, 3), 100.0);
        assert_eq!(overlap_percent(0, 3), 0.0);
        assert_eq!(overlap_percent(0, 0), 0.0);
    }

    #[tokio::test]
    async fn test_matching_example() {
        let repo = LocalRepository::new();
        let a = seed_user(&repo, "Thornwick").await;
        let b = seed_user(&repo, "Mira").await;

        set_available(&repo, a, &[10, 11, 12]).await;
        set_available(&repo, b, &[11, 12, 13]).await;

        let data = compute_matches(&repo, a, 10, 13).await.unwrap();
        assert!(!data.reference_empty);
        assert_eq!(data.reference_slots, 3);
        assert_eq!(data.matches.len(), 1);
        assert_eq!(data.matches[0].user_id, b);
        assert_eq!(data.matches[0].overlap, 2);
        assert_eq!(data.matches[0].overlap_percent, 66.7);
    }

    #[tokio::test]
    async fn test_matching_empty_reference() {
        let repo = LocalRepository::new();
        let a = seed_user(&repo, "Thornwick").await;
        let b = seed_user(&repo, "Mira").await;
        set_available(&repo, b, &[11, 12]).await;

        let data = compute_matches(&repo, a, 10, 13).await.unwrap();
        assert!(data.reference_empty);
        assert_eq!(data.reference_slots, 0);
        assert!(data.matches.is_empty());
    }

    #[tokio::test]
    async fn test_matching_sorted_by_overlap() {
        let repo = LocalRepository::new();
        let a = seed_user(&repo, "Thornwick").await;
        let b = seed_user(&repo, "Mira").await;
        let c = seed_user(&repo, "Lumen").await;

        set_available(&repo, a, &[10, 11, 12, 13]).await;
        set_available(&repo, b, &[10]).await;
        set_available(&repo, c, &[10, 11, 12]).await;

        let data = compute_matches(&repo, a, 10, 13).await.unwrap();
        assert_eq!(data.matches.len(), 2);
        assert_eq!(data.matches[0].user_id, c);
        assert_eq!(data.matches[0].overlap, 3);
        assert_eq!(data.matches[1].user_id, b);
        assert_eq!(data.matches[1].overlap, 1);
    }

    #[tokio::test]
    async fn test_matching_ignores_maybe_and_out_of_range() {
        let repo = LocalRepository::new();
        let a = seed_user(&repo, "Thornwick").await;
        let b = seed_user(&repo, "Mira").await;

        set_available(&repo, a, &[10, 11]).await;
        // Maybe doesn't count toward matches
        crate::db::services::set_slot(&repo, b, 10, 1).await.unwrap();
        // Out of the queried range
        set_available(&repo, b, &[20]).await;

        let data = compute_matches(&repo, a, 10, 15).await.unwrap();
        assert!(data.matches.is_empty());
        assert_eq!(data.reference_slots, 2);
    }

    #[tokio::test]
    async fn test_matching_caller_range_respected() {
        let repo = LocalRepository::new();
        let a = seed_user(&repo, "Thornwick").await;
        let b = seed_user(&repo, "Mira").await;

        // Caller availability outside the range doesn't count as reference
        set_available(&repo, a, &[5, 10]).await;
        set_available(&repo, b, &[10]).await;

        let data = compute_matches(&repo, a, 10, 13).await.unwrap();
        assert_eq!(data.reference_slots, 1);
        assert_eq!(data.matches.len(), 1);
        assert_eq!(data.matches[0].overlap_percent, 100.0);
    }
}
