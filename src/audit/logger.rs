// Audit logger implementation

use super::storage::AuditStorage;
use super::types::{AuditAction, AuditEntry};
use crate::session::Session;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Fire-and-forget audit logger.
///
/// `log` never waits: entries go to a bounded channel drained by a writer task.
/// When the channel is full the entry is dropped with a warning.
#[derive(Clone)]
pub struct AuditLogger {
    sender: mpsc::Sender<AuditEntry>,
}

impl AuditLogger {
    /// Start the writer task. It exits once every logger clone is dropped.
    pub fn spawn(storage: Arc<dyn AuditStorage>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<AuditEntry>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                info!(
                    "Audit: {} user={:?} token={:?} success={}",
                    entry.action.as_str(),
                    entry.user_id,
                    entry.token_fingerprint,
                    entry.success
                );

                if let Err(e) = storage.store(entry).await {
                    error!("Failed to store audit entry: {}", e);
                }
            }
        });

        (Self { sender }, handle)
    }

    /// Queue an audit event
    pub fn log(&self, entry: AuditEntry) {
        match self.sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                warn!(
                    "Audit channel full, dropping {} entry",
                    entry.action.as_str()
                );
            }
            Err(TrySendError::Closed(entry)) => {
                error!(
                    "Audit writer stopped, dropping {} entry",
                    entry.action.as_str()
                );
            }
        }
    }

    /// Log a successful GetSession, minted or reused
    pub fn log_session_issued(&self, session: &Session, reused: bool, request_id: Option<&str>) {
        let action = if reused {
            AuditAction::SessionReused
        } else {
            AuditAction::SessionIssued
        };

        self.log(
            AuditEntry::record(action)
                .user_id(session.user_id.as_str())
                .token_fingerprint(Some(session.token.fingerprint()))
                .metadata("expires_at", session.expires_at.to_rfc3339())
                .request_id(request_id)
                .build(),
        );
    }

    pub fn log_session_revoked(&self, session: &Session, request_id: Option<&str>) {
        self.log(
            AuditEntry::record(AuditAction::SessionRevoked)
                .user_id(session.user_id.as_str())
                .token_fingerprint(Some(session.token.fingerprint()))
                .request_id(request_id)
                .build(),
        );
    }

    pub fn log_rate_limited(&self, user_id: &str, retry_after_secs: u64) {
        self.log(
            AuditEntry::record(AuditAction::RateLimitExceeded)
                .user_id(user_id)
                .metadata("retry_after_secs", retry_after_secs.to_string())
                .build(),
        );
    }

    /// Log a token that failed its integrity check
    pub fn log_invalid_token(&self, fingerprint: Option<String>, operation: &str) {
        self.log(
            AuditEntry::record(AuditAction::InvalidTokenPresented)
                .token_fingerprint(fingerprint)
                .metadata("operation", operation)
                .build(),
        );
    }
}
