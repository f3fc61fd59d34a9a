// Session types and data structures

use super::token::SessionToken;
use crate::clock::{MAX_POLICY_SECS, policy_duration};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Secret used to tag session tokens (at least 32 bytes)
    #[serde(default)]
    pub token_secret: String,
    /// Session lifetime from issuance
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
    /// A live session with less time left than this is replaced instead of reused
    #[serde(default = "default_renew_before_secs")]
    pub renew_before_secs: i64,
    /// Maximum concurrent live sessions per user
    #[serde(default = "default_max_sessions_per_user")]
    pub max_sessions_per_user: usize,
    /// How long expired records are kept to tolerate caller clock skew
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: i64,
    /// Interval between background sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum number of stored session records
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,
    /// Delay before the single internal retry of a failed store call
    #[serde(default = "default_store_retry_delay_ms")]
    pub store_retry_delay_ms: u64,
}

fn default_ttl_secs() -> i64 {
    3600
}

fn default_renew_before_secs() -> i64 {
    300
}

fn default_max_sessions_per_user() -> usize {
    5
}

fn default_grace_period_secs() -> i64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_store_capacity() -> usize {
    1_000_000
}

fn default_store_retry_delay_ms() -> u64 {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            ttl_secs: default_ttl_secs(),
            renew_before_secs: default_renew_before_secs(),
            max_sessions_per_user: default_max_sessions_per_user(),
            grace_period_secs: default_grace_period_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            store_capacity: default_store_capacity(),
            store_retry_delay_ms: default_store_retry_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        policy_duration(self.ttl_secs)
    }

    pub fn renew_before(&self) -> Duration {
        policy_duration(self.renew_before_secs)
    }

    pub fn grace_period(&self) -> Duration {
        policy_duration(self.grace_period_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.token_secret.len() < 32 {
            return Err("session.token_secret must be at least 32 bytes".to_string());
        }
        if self.ttl_secs <= 0 {
            return Err("session.ttl_secs must be positive".to_string());
        }
        if self.ttl_secs > MAX_POLICY_SECS {
            return Err(format!(
                "session.ttl_secs must be at most {}",
                MAX_POLICY_SECS
            ));
        }
        if self.renew_before_secs < 0 || self.renew_before_secs >= self.ttl_secs {
            return Err("session.renew_before_secs must be in [0, ttl_secs)".to_string());
        }
        if self.max_sessions_per_user == 0 {
            return Err("session.max_sessions_per_user must be at least 1".to_string());
        }
        if self.grace_period_secs < 0 {
            return Err("session.grace_period_secs must not be negative".to_string());
        }
        if self.grace_period_secs > MAX_POLICY_SECS {
            return Err(format!(
                "session.grace_period_secs must be at most {}",
                MAX_POLICY_SECS
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err("session.sweep_interval_secs must be at least 1".to_string());
        }
        if self.store_capacity == 0 {
            return Err("session.store_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Observable session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Issued and usable
    Active,
    /// Past its expiry; awaiting sweep
    Expired,
    /// Explicitly revoked; terminal
    Revoked,
}

/// Server-side session record. Only `revoked` ever changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub session_id: u128,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Session {
    pub fn new(
        token: SessionToken,
        session_id: u128,
        user_id: String,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token,
            session_id,
            user_id,
            issued_at,
            expires_at: issued_at + ttl,
            revoked: false,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }

    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.revoked {
            SessionStatus::Revoked
        } else if now >= self.expires_at {
            SessionStatus::Expired
        } else {
            SessionStatus::Active
        }
    }

    /// Whether less than `window` of validity remains
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at - now <= window
    }

    /// Whether the sweep may drop this record
    pub fn is_collectable(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires_at + grace < now
    }

    pub fn revoke(&mut self) {
        self.revoked = true;
    }
}
