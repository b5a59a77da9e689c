use serde::{Deserialize, Serialize};

use crate::api::UserId;

// =========================================================
// Schedule matching types
// =========================================================

/// One candidate user ranked against the caller's available slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub user_id: UserId,
    pub character_name: String,
    pub character_class: String,
    /// Count of the candidate's Available slots that fall in the caller's
    /// Available set.
    pub overlap: usize,
    /// `overlap / |caller's Available slots| * 100`, rounded to one decimal.
    pub overlap_percent: f64,
}

/// Matching query result, sorted descending by overlap (ties unordered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchData {
    pub matches: Vec<MatchCandidate>,
    /// Size of the caller's Available set within the queried range.
    pub reference_slots: usize,
    /// True when the caller had no Available slots in range; the match list
    /// is then empty by construction rather than an error.
    pub reference_empty: bool,
}

/// Route function name constant for the matching query
pub const GET_MATCH_DATA: &str = "get_match_data";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_candidate_clone() {
        let candidate = MatchCandidate {
            user_id: UserId::new(2),
            character_name: "Mira".to_string(),
            character_class: "priest".to_string(),
            overlap: 4,
            overlap_percent: 80.0,
        };
        let cloned = candidate.clone();
        assert_eq!(cloned.overlap, 4);
        assert_eq!(cloned.overlap_percent, 80.0);
    }

    #[test]
    fn test_match_data_debug() {
        let data = MatchData {
            matches: vec![],
            reference_slots: 0,
            reference_empty: true,
        };
        let debug_str = format!("{:?}", data);
        assert!(debug_str.contains("MatchData"));
    }

    #[test]
    fn test_const_value() {
        assert_eq!(GET_MATCH_DATA, "get_match_data");
    }
}
