use serde::{Deserialize, Serialize};

use crate::models::AggregateSlotCount;

/// Heatmap dataset: the materialized per-slot counts for a slot range.
///
/// Aggregate rows are exposed read-only; they are never writable through the
/// API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapData {
    pub aggregates: Vec<AggregateSlotCount>,
}

/// Route function name constant for the heatmap query
pub const GET_HEATMAP_DATA: &str = "get_heatmap_data";
