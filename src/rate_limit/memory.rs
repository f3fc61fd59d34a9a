// In-memory rate limiter using a sliding window log

use super::{RateLimitConfig, RateLimiter};
use crate::clock::{MAX_POLICY_SECS, policy_duration};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Keeps the timestamps of recent events per key. A key is limited once it
/// has `max_events` timestamps inside the trailing window.
pub struct SlidingWindowRateLimiter {
    windows: DashMap<String, VecDeque<DateTime<Utc>>>,
    max_events: usize,
    window: Duration,
}

impl SlidingWindowRateLimiter {
    pub fn new(max_events: u32, window_secs: u64) -> Self {
        Self {
            windows: DashMap::new(),
            max_events: max_events as usize,
            window: policy_duration(window_secs.min(MAX_POLICY_SECS as u64) as i64),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_issuances, config.window_secs)
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn check_rate_limit(&self, key: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let mut events = self.windows.entry(key.to_string()).or_default();
        let window_start = now - self.window;

        while events.front().is_some_and(|t| *t <= window_start) {
            events.pop_front();
        }

        if events.len() < self.max_events {
            events.push_back(now);
            return Ok(());
        }

        // The oldest event in the window is the next one to slide out
        let retry_after = match events.front() {
            Some(oldest) => {
                let remaining = (*oldest + self.window - now).num_milliseconds();
                ((remaining + 999) / 1000).max(1) as u64
            }
            None => 1,
        };
        debug!("Rate limit hit for {}, retry after {}s", key, retry_after);
        Err(retry_after)
    }

    async fn release(&self, key: &str, at: DateTime<Utc>) {
        if let Some(mut events) = self.windows.get_mut(key)
            && let Some(pos) = events.iter().rposition(|t| *t == at)
        {
            events.remove(pos);
            debug!("Released rate limit event for {}", key);
        }
    }

    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - self.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, events| events.back().is_some_and(|t| *t > window_start));
        before.saturating_sub(self.windows.len())
    }
}
