//! Time utilities.

use chrono::{DateTime, Utc};

/// A wall-clock timestamp (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Time elapsed since `timestamp`, zero if it lies in the future.
pub fn age_of(timestamp: Timestamp) -> std::time::Duration {
    (now() - timestamp).to_std().unwrap_or(std::time::Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_age_of() {
        let past = now() - Duration::seconds(10);
        assert!(age_of(past) >= std::time::Duration::from_secs(10));

        let future = now() + Duration::seconds(10);
        assert_eq!(age_of(future), std::time::Duration::ZERO);
    }
}
