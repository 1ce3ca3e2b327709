//! Time source for expiry and token lifetimes.

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use super::lock::mutex_lock;

/// Supplies the current time to the cache.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, value: OffsetDateTime) {
        *mutex_lock(&self.now, "cache::clock", "set") = value;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = mutex_lock(&self.now, "cache::clock", "advance");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *mutex_lock(&self.now, "cache::clock", "now")
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn manual_clock_advances_and_clones_share_time() {
        let clock = ManualClock::new(datetime!(2026-01-01 00:00 UTC));
        let other = clock.clone();
        clock.advance(time::Duration::minutes(5));
        assert_eq!(other.now(), datetime!(2026-01-01 00:05 UTC));

        other.set(datetime!(2026-02-01 00:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-02-01 00:00 UTC));
    }
}
