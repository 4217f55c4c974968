//! UUID v7 utilities for job identifiers.
//!
//! Job ids are UUIDv7 so they sort by submission time in logs and in the
//! PostgreSQL index.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use lithybrid_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check whether an id is a UUIDv7.
#[inline]
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

/// Parse a job id from a path segment. Only UUIDv7 ids are accepted.
pub fn parse_job_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok().filter(is_v7)
}

/// Timestamp embedded in a UUIDv7.
pub fn extract_timestamp(id: &Uuid) -> Option<DateTime<Utc>> {
    if !is_v7(id) {
        return None;
    }
    let bytes = id.as_bytes();
    let millis = bytes[..6]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        assert!(is_v7(&new_v7()));
        assert!(!is_v7(&Uuid::new_v4()));
    }

    #[test]
    fn test_ids_are_time_ordered() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(b > a);
    }

    #[test]
    fn test_parse_job_id() {
        let id = new_v7();
        assert_eq!(parse_job_id(&id.to_string()), Some(id));
        assert_eq!(parse_job_id("not-a-uuid"), None);
        assert_eq!(parse_job_id(&Uuid::new_v4().to_string()), None);
    }

    #[test]
    fn test_extract_timestamp_close_to_now() {
        let before = Utc::now().timestamp_millis();
        let ts = extract_timestamp(&new_v7()).unwrap().timestamp_millis();
        let after = Utc::now().timestamp_millis();
        assert!(ts >= before - 1 && ts <= after + 1);
        assert!(extract_timestamp(&Uuid::nil()).is_none());
    }
}
