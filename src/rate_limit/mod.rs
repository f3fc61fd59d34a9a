// Issuance rate limiting
// Protects the session store from issuance storms for a single user

pub mod memory;

use crate::clock::MAX_POLICY_SECS;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::SlidingWindowRateLimiter;

/// Rate limiter trait for different backend implementations
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Record an event for `key` if the window allows it.
    /// Returns Ok(()) if allowed, Err with retry-after seconds if rate limited.
    async fn check_rate_limit(&self, key: &str, now: DateTime<Utc>) -> Result<(), u64>;

    /// Give back the event recorded for `key` at `at` when the limited action
    /// did not happen.
    async fn release(&self, key: &str, at: DateTime<Utc>);

    /// Drop windows with no events newer than the window length.
    /// Returns the number of keys removed.
    async fn prune(&self, now: DateTime<Utc>) -> usize;
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum session mints per user per window
    #[serde(default = "default_max_issuances")]
    pub max_issuances: u32,
    /// Sliding window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_issuances() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_issuances: default_max_issuances(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_issuances == 0 {
            return Err("rate_limit.max_issuances must be at least 1".to_string());
        }
        if self.window_secs == 0 {
            return Err("rate_limit.window_secs must be at least 1".to_string());
        }
        if self.window_secs > MAX_POLICY_SECS as u64 {
            return Err(format!(
                "rate_limit.window_secs must be at most {}",
                MAX_POLICY_SECS
            ));
        }
        Ok(())
    }
}
