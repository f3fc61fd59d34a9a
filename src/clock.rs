// Time source abstraction so issuance and sweep policy can be driven in tests

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Upper bound, in seconds, for any configured policy duration (ten years).
/// Keeps timestamp arithmetic far inside chrono's range.
pub const MAX_POLICY_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Policy seconds as a `Duration`, clamped to `0..=MAX_POLICY_SECS`
pub fn policy_duration(secs: i64) -> Duration {
    Duration::seconds(secs.clamp(0, MAX_POLICY_SECS))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Clock starting at the Unix epoch
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_epoch();
        assert_eq!(clock.now().timestamp(), 0);

        clock.advance(Duration::seconds(100));
        assert_eq!(clock.now().timestamp(), 100);

        clock.set(DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(4000));
        assert_eq!(clock.now().timestamp(), 4000);
    }

    #[test]
    fn test_policy_duration_is_clamped() {
        assert_eq!(policy_duration(60), Duration::seconds(60));
        assert_eq!(policy_duration(-5), Duration::zero());
        assert_eq!(policy_duration(i64::MAX), Duration::seconds(MAX_POLICY_SECS));
    }
}
