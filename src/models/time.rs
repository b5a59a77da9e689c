use serde::*;

/// Length of one availability slot in seconds (30 minutes).
pub const SLOT_SECONDS: i64 = 1800;

/// Half-hour time bucket identifier.
/// Slot 0 = 1970-01-01 00:00:00 UTC; slot N covers `[N * 1800, (N + 1) * 1800)`
/// in epoch seconds. The numbering is timezone-naive and globally shared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SlotIndex(i64);

impl SlotIndex {
    /// Create a new slot index.
    pub fn new(v: i64) -> Self {
        Self(v)
    }

    /// Raw bucket number as i64.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Create from a Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    /// Truncates toward negative infinity so pre-epoch instants bucket correctly.
    pub fn from_unix_timestamp(timestamp: i64) -> Self {
        Self(timestamp.div_euclid(SLOT_SECONDS))
    }

    /// Create from a chrono DateTime<Utc>.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp())
    }

    /// Start of the slot as chrono DateTime<Utc>.
    pub fn start_time(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.0 * SLOT_SECONDS, 0)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }

    /// End of the slot (exclusive) as chrono DateTime<Utc>.
    pub fn end_time(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp((self.0 + 1) * SLOT_SECONDS, 0)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH)
    }
}

impl From<i64> for SlotIndex {
    fn from(v: i64) -> Self {
        SlotIndex::new(v)
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{SlotIndex, SLOT_SECONDS};

    #[test]
    fn test_slot_index_new() {
        let slot = SlotIndex::new(960_000);
        assert_eq!(slot.value(), 960_000);
    }

    #[test]
    fn test_slot_index_from_i64() {
        let slot: SlotIndex = 12_345.into();
        assert_eq!(slot.value(), 12_345);
    }

    #[test]
    fn test_from_unix_timestamp_rounds_down() {
        assert_eq!(SlotIndex::from_unix_timestamp(0).value(), 0);
        assert_eq!(SlotIndex::from_unix_timestamp(1799).value(), 0);
        assert_eq!(SlotIndex::from_unix_timestamp(1800).value(), 1);
        assert_eq!(SlotIndex::from_unix_timestamp(3599).value(), 1);
    }

    #[test]
    fn test_from_unix_timestamp_pre_epoch() {
        // div_euclid keeps pre-epoch instants in their containing bucket
        assert_eq!(SlotIndex::from_unix_timestamp(-1).value(), -1);
        assert_eq!(SlotIndex::from_unix_timestamp(-1800).value(), -1);
        assert_eq!(SlotIndex::from_unix_timestamp(-1801).value(), -2);
    }

    #[test]
    fn test_start_end_time() {
        let slot = SlotIndex::new(2);
        assert_eq!(slot.start_time().timestamp(), 2 * SLOT_SECONDS);
        assert_eq!(slot.end_time().timestamp(), 3 * SLOT_SECONDS);
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let slot = SlotIndex::from_datetime(dt);
        assert!(slot.start_time() <= dt);
        assert!(dt < slot.end_time());
    }

    #[test]
    fn test_ordering() {
        assert!(SlotIndex::new(10) < SlotIndex::new(11));
    }
}
