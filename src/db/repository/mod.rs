//! Repository trait layer: abstract interfaces over the relational store.
//!
//! The traits are split by concern — slots and aggregates
//! ([`AvailabilityRepository`]), roster ([`UserRepository`]), and groups
//! ([`GroupRepository`]) — with [`FullRepository`] combining them for
//! call sites that need the whole store behind one `Arc<dyn _>`.

pub mod error;
pub mod groups;
pub mod slots;
pub mod users;

pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use groups::GroupRepository;
pub use slots::AvailabilityRepository;
pub use users::UserRepository;

/// Combined repository interface implemented by every storage backend.
pub trait FullRepository:
    AvailabilityRepository + UserRepository + GroupRepository + Send + Sync
{
}

impl<T> FullRepository for T where
    T: AvailabilityRepository + UserRepository + GroupRepository + Send + Sync
{
}
