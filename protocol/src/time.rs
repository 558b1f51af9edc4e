//! # Clock Sources
//!
//! The upgrader asks "what time is it?" once per connection to pick a parse
//! mode, and the claim verifier needs "now" for its future bound. Both go
//! through [`TimeSource`] so tests can stand on either side of an epoch
//! without sleeping until the year 10000.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Source of wall-clock time. Must be cheap; called on every upgrade.
pub trait TimeSource: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current time in whole seconds since the Unix epoch. Instants before
    /// 1970 clamp to zero.
    fn unix_now(&self) -> u64 {
        u64::try_from(self.now().timestamp()).unwrap_or(0)
    }
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    instant: DateTime<Utc>,
}

impl FixedTimeSource {
    /// Create a fixed clock at `instant`.
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// Create a fixed clock at `secs` seconds after the Unix epoch.
    /// Out-of-range values fall back to the epoch itself.
    pub fn from_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// A copy of this clock moved by `delta`.
    pub fn shifted(&self, delta: Duration) -> Self {
        Self::new(self.instant + delta)
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// Shared handle type the upgrader stores.
pub type SharedTimeSource = Arc<dyn TimeSource>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_source_reports_its_instant() {
        let clock = FixedTimeSource::from_unix(1_700_000_000);
        assert_eq!(clock.unix_now(), 1_700_000_000);
        assert_eq!(clock.now().timestamp(), 1_700_000_000);
    }

    #[test]
    fn shifted_moves_both_ways() {
        let clock = FixedTimeSource::from_unix(1_000);
        assert_eq!(clock.shifted(Duration::seconds(5)).unix_now(), 1_005);
        assert_eq!(clock.shifted(Duration::seconds(-5)).unix_now(), 995);
    }

    #[test]
    fn pre_epoch_clamps_to_zero() {
        let clock = FixedTimeSource::from_unix(-50);
        assert_eq!(clock.unix_now(), 0);
    }

    #[test]
    fn system_source_is_recent() {
        // Anything after 2024-01-01 is good enough to prove we read the clock.
        assert!(SystemTimeSource.unix_now() > 1_704_067_200);
    }
}
