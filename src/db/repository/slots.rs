//! Availability repository trait: the slot store and its aggregate
//! maintainer.
//!
//! Every write operation carries the aggregate maintenance contract: after
//! the operation commits, the [`AggregateSlotCount`](crate::models::AggregateSlotCount)
//! row for each touched slot index equals the live counts of Available and
//! Maybe rows at that index, and the row mutations plus the recompute are
//! atomic as a unit. Implementations collect the distinct slot indices dirtied
//! by a batch in a transaction-scoped set and recompute each index once after
//! all row mutations are applied, before commit.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::UserId;
use crate::models::{AggregateSlotCount, AvailabilitySlot, SlotFilter, SlotIndex, SlotState};

/// Repository trait for the slot store and aggregate reads.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Check that the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Set one user's state for one slot.
    ///
    /// `Unavailable` deletes any existing row; `Maybe`/`Available` insert or
    /// update in place. Idempotent: setting the same state twice yields the
    /// same stored row. Slot indices are plain integer keys and are not
    /// bounds-checked.
    async fn set_slot(
        &self,
        user_id: UserId,
        slot_index: SlotIndex,
        state: SlotState,
    ) -> RepositoryResult<()>;

    /// Apply `set_slot` semantics for each entry, in input order, committing
    /// the whole batch as one transaction or none.
    ///
    /// Duplicate slot indices are allowed; the last entry for an index wins.
    /// The aggregate for each distinct touched index is recomputed once, after
    /// all entries are applied.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of row mutations performed (inserts, updates,
    ///   deletes); no-op entries are not counted
    async fn bulk_set_slots(
        &self,
        user_id: UserId,
        entries: &[(SlotIndex, SlotState)],
    ) -> RepositoryResult<usize>;

    /// Fetch slot rows matching the filter. Result order is
    /// implementation-defined.
    async fn query_slots(&self, filter: &SlotFilter) -> RepositoryResult<Vec<AvailabilitySlot>>;

    /// Fetch aggregate rows, restricted to the inclusive range when both
    /// bounds are given.
    async fn fetch_aggregates(
        &self,
        start_slot: Option<SlotIndex>,
        end_slot: Option<SlotIndex>,
    ) -> RepositoryResult<Vec<AggregateSlotCount>>;

    /// Drop all aggregate rows and recompute one per distinct slot index
    /// present in the slot store (maintenance operation).
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of aggregate rows rebuilt
    async fn rebuild_aggregates(&self) -> RepositoryResult<usize>;
}
