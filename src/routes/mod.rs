pub mod availability;
pub mod groups;
pub mod heatmap;
pub mod matching;

#[cfg(test)]
mod tests {
    #[test]
    fn test_module_structure() {
        // Test that all route module constants are accessible
        assert_eq!(
            super::availability::GET_AVAILABILITY_DATA,
            "get_availability_data"
        );
        assert_eq!(
            super::availability::BULK_UPDATE_AVAILABILITY,
            "bulk_update_availability"
        );
        assert_eq!(super::heatmap::GET_HEATMAP_DATA, "get_heatmap_data");
        assert_eq!(super::matching::GET_MATCH_DATA, "get_match_data");
        assert_eq!(
            super::groups::GET_GROUP_SCHEDULE_DATA,
            "get_group_schedule_data"
        );
    }
}
