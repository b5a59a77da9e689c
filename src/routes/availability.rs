use serde::{Deserialize, Serialize};

use crate::models::{AvailabilitySlot, User};

// =========================================================
// Availability query types
// =========================================================

/// Availability query result: matching slot rows plus the users they
/// belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityData {
    pub slots: Vec<AvailabilitySlot>,
    pub users: Vec<User>,
}

/// Outcome of a bulk availability write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BulkUpdateOutcome {
    /// Row mutations performed (inserts, updates, and deletes).
    pub applied: usize,
    /// Entries skipped because their state was outside the {0, 1, 2}
    /// whitelist.
    pub skipped: usize,
}

/// Route function name constant for the availability query
pub const GET_AVAILABILITY_DATA: &str = "get_availability_data";
/// Route function name constant for the bulk write
pub const BULK_UPDATE_AVAILABILITY: &str = "bulk_update_availability";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_data_debug() {
        let data = AvailabilityData {
            slots: vec![],
            users: vec![],
        };
        let debug_str = format!("{:?}", data);
        assert!(debug_str.contains("AvailabilityData"));
    }

    #[test]
    fn test_bulk_outcome_serde() {
        let outcome = BulkUpdateOutcome {
            applied: 3,
            skipped: 1,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"applied\":3"));
        assert!(json.contains("\"skipped\":1"));
    }

    #[test]
    fn test_const_values() {
        assert_eq!(GET_AVAILABILITY_DATA, "get_availability_data");
        assert_eq!(BULK_UPDATE_AVAILABILITY, "bulk_update_availability");
    }
}
