//! Time-based freshness of locally cached values.
//!
//! Freshness only decides whether a request is made at all. Once the window
//! has passed the client must revalidate with the origin, even if it still
//! holds a validator.

use std::time::Duration;

use time::OffsetDateTime;

/// Default freshness window: 30 minutes.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(30 * 60);

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

/// True once more than `threshold` has elapsed since `fetched_at`.
pub fn is_expired(fetched_at: i64, threshold: Duration) -> bool {
    is_expired_at(fetched_at, now_ms(), threshold)
}

pub fn is_expired_at(fetched_at: i64, now: i64, threshold: Duration) -> bool {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(fetched_at) > threshold_ms
}
