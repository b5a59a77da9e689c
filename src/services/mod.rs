//! Service layer for read-side business logic.
//!
//! This module contains the computations derived from the slot store: the
//! schedule matching query and the group schedule pivot. Services orchestrate
//! repository reads and implement the ranking and shaping logic.

pub mod group_schedule;
pub mod matching;

pub use group_schedule::group_schedule_data;
pub use matching::compute_matches;
