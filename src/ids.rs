//! Record identifiers and millisecond timestamps.

use chrono::Utc;
use uuid::Uuid;

use crate::model::TimestampMs;

/// Generate a fresh, collision-resistant record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> TimestampMs {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_uuids() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_now_is_ordered() {
        let first = now_ms();
        let second = now_ms();
        assert!(first > 1_600_000_000_000, "timestamp should be in ms");
        assert!(second >= first);
    }
}
