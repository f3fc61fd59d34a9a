// Audit record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One session lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    /// Fingerprint of the session token, never the token itself
    pub token_fingerprint: Option<String>,
    pub action: AuditAction,
    pub level: AuditLevel,
    pub success: bool,
    pub metadata: HashMap<String, String>,
    /// Value of the caller's `x-request-id` header
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SessionIssued,
    SessionReused,
    SessionRevoked,
    RateLimitExceeded,
    InvalidTokenPresented,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::SessionIssued => "session_issued",
            AuditAction::SessionReused => "session_reused",
            AuditAction::SessionRevoked => "session_revoked",
            AuditAction::RateLimitExceeded => "rate_limit_exceeded",
            AuditAction::InvalidTokenPresented => "invalid_token_presented",
        }
    }

    /// Severity recorded for this action
    pub fn level(&self) -> AuditLevel {
        match self {
            AuditAction::SessionIssued
            | AuditAction::SessionReused
            | AuditAction::SessionRevoked => AuditLevel::Info,
            AuditAction::RateLimitExceeded => AuditLevel::Warning,
            AuditAction::InvalidTokenPresented => AuditLevel::Security,
        }
    }

    /// Whether the action records a rejected request
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AuditAction::RateLimitExceeded | AuditAction::InvalidTokenPresented
        )
    }
}

/// Ordered so queries can ask for a minimum severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Info,
    Warning,
    Security,
}

/// Filter for `AuditStorage::query`. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub user_id: Option<String>,
    pub action: Option<AuditAction>,
    pub min_level: Option<AuditLevel>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.user_id
            .as_ref()
            .is_none_or(|user| entry.user_id.as_ref() == Some(user))
            && self.action.is_none_or(|action| entry.action == action)
            && self.min_level.is_none_or(|level| entry.level >= level)
            && self.start_time.is_none_or(|start| entry.timestamp >= start)
            && self.end_time.is_none_or(|end| entry.timestamp <= end)
    }
}

impl AuditEntry {
    /// Start an entry for `action`; level and outcome follow from the action
    pub fn record(action: AuditAction) -> AuditEntryBuilder {
        AuditEntryBuilder {
            action,
            user_id: None,
            token_fingerprint: None,
            metadata: HashMap::new(),
            request_id: None,
        }
    }
}

pub struct AuditEntryBuilder {
    action: AuditAction,
    user_id: Option<String>,
    token_fingerprint: Option<String>,
    metadata: HashMap<String, String>,
    request_id: Option<String>,
}

impl AuditEntryBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn token_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.token_fingerprint = fingerprint;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(str::to_string);
        self
    }

    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id: self.user_id,
            token_fingerprint: self.token_fingerprint,
            level: self.action.level(),
            success: !self.action.is_rejection(),
            action: self.action,
            metadata: self.metadata,
            request_id: self.request_id,
        }
    }
}
