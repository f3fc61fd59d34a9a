// Credentials service: the caller-facing GetSession, ResolveSession and RevokeSession operations

use crate::audit::AuditLogger;
use crate::error::{IssueError, ServiceError};
use crate::metrics;
use crate::models::{ResolveSessionResponse, SessionResponse};
use crate::session::{SessionIssuer, SessionToken};
use std::sync::Arc;
use tracing::{error, warn};

/// Longest accepted user identifier
pub const MAX_USER_ID_LEN: usize = 128;

/// Validate an opaque user identifier: 1..=128 chars of `[A-Za-z0-9._:@-]`
pub fn validate_user_id(user_id: &str) -> Result<(), ServiceError> {
    if user_id.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "user_id must not be empty".to_string(),
        ));
    }

    if user_id.len() > MAX_USER_ID_LEN {
        return Err(ServiceError::InvalidArgument(format!(
            "user_id must be at most {} characters",
            MAX_USER_ID_LEN
        )));
    }

    let allowed =
        |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '@' | '-');
    if !user_id.chars().all(allowed) {
        return Err(ServiceError::InvalidArgument(
            "user_id contains unsupported characters".to_string(),
        ));
    }

    Ok(())
}

#[derive(Clone)]
pub struct CredentialsService {
    issuer: Arc<SessionIssuer>,
    audit: AuditLogger,
}

impl CredentialsService {
    pub fn new(issuer: Arc<SessionIssuer>, audit: AuditLogger) -> Self {
        Self { issuer, audit }
    }

    pub fn issuer(&self) -> &Arc<SessionIssuer> {
        &self.issuer
    }

    /// Return a live session token for `user_id`, minting one when needed.
    ///
    /// Issuance and its audit record run on their own task, so a caller that
    /// gives up mid-request cannot leave a stored session unaudited.
    pub async fn get_session(
        &self,
        user_id: &str,
        request_id: Option<&str>,
    ) -> Result<SessionResponse, ServiceError> {
        validate_user_id(user_id)?;

        let issuer = self.issuer.clone();
        let audit = self.audit.clone();
        let owned_user_id = user_id.to_string();
        let request_id = request_id.map(str::to_string);
        let outcome = tokio::spawn(async move {
            let outcome = issuer.issue_or_renew(&owned_user_id).await;
            match &outcome {
                Ok(issuance) => audit.log_session_issued(
                    &issuance.session,
                    issuance.reused,
                    request_id.as_deref(),
                ),
                Err(IssueError::RateLimited { retry_after_secs }) => {
                    audit.log_rate_limited(&owned_user_id, *retry_after_secs)
                }
                Err(_) => {}
            }
            outcome
        })
        .await
        .map_err(|e| {
            error!("Session issuance task failed for user {}: {}", user_id, e);
            metrics::record_error("task_failed", "get_session");
            ServiceError::Internal
        })?;

        match outcome {
            Ok(issuance) => {
                let session = issuance.session;
                Ok(SessionResponse {
                    token: session.token.to_base64(),
                    user_id: session.user_id,
                    issued_at: session.issued_at,
                    expires_at: session.expires_at,
                })
            }
            Err(IssueError::RateLimited { retry_after_secs }) => {
                Err(ServiceError::RateLimited { retry_after_secs })
            }
            Err(e) => Err(self.internal(e, "get_session")),
        }
    }

    /// Identify the user behind a live token
    pub async fn resolve_session(
        &self,
        token_text: &str,
    ) -> Result<ResolveSessionResponse, ServiceError> {
        let token = self.parse_token(token_text, "resolve")?;

        match self.issuer.resolve(&token).await {
            Ok(session) => Ok(ResolveSessionResponse {
                user_id: session.user_id,
                expires_at: session.expires_at,
            }),
            Err(IssueError::InvalidToken) => Err(self.invalid_token(Some(&token), "resolve")),
            Err(IssueError::NotFound) => Err(ServiceError::NotFound),
            Err(e) => Err(self.internal(e, "resolve")),
        }
    }

    /// Revoke a token. Revoking an already revoked token succeeds.
    pub async fn revoke_session(
        &self,
        token_text: &str,
        request_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        let token = self.parse_token(token_text, "revoke")?;

        let issuer = self.issuer.clone();
        let audit = self.audit.clone();
        let request_id = request_id.map(str::to_string);
        let outcome = tokio::spawn(async move {
            let outcome = issuer.revoke(&token).await;
            if let Ok(session) = &outcome {
                audit.log_session_revoked(session, request_id.as_deref());
            }
            outcome
        })
        .await
        .map_err(|e| {
            error!("Session revocation task failed: {}", e);
            metrics::record_error("task_failed", "revoke");
            ServiceError::Internal
        })?;

        match outcome {
            Ok(_) => Ok(()),
            Err(IssueError::InvalidToken) => Err(self.invalid_token(Some(&token), "revoke")),
            Err(IssueError::NotFound) => Err(ServiceError::NotFound),
            Err(e) => Err(self.internal(e, "revoke")),
        }
    }

    fn parse_token(&self, token_text: &str, operation: &str) -> Result<SessionToken, ServiceError> {
        SessionToken::from_base64(token_text.trim())
            .map_err(|_| self.invalid_token(None, operation))
    }

    /// Forged or mangled tokens are indistinguishable from unknown ones to the caller
    fn invalid_token(&self, token: Option<&SessionToken>, operation: &str) -> ServiceError {
        let fingerprint = token.map(SessionToken::fingerprint);
        warn!(
            target: "credentials_api::security",
            "Invalid token presented to {} (fingerprint {:?})",
            operation,
            fingerprint
        );
        metrics::record_invalid_token(operation);
        self.audit.log_invalid_token(fingerprint, operation);
        ServiceError::NotFound
    }

    fn internal(&self, err: IssueError, operation: &str) -> ServiceError {
        error!("{} failed: {}", operation, err);
        metrics::record_error("internal", operation);
        ServiceError::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditAction, AuditQuery, AuditStorage, MemoryAuditStorage};
    use crate::clock::ManualClock;
    use crate::rate_limit::SlidingWindowRateLimiter;
    use crate::error::StoreError;
    use crate::session::{
        MemorySessionStore, Session, SessionConfig, SessionStore, TokenCodec, UserSessionIndex,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::time::Duration as StdDuration;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn build_service(max_issuances: u32) -> (CredentialsService, Arc<MemoryAuditStorage>) {
        let store = Arc::new(MemorySessionStore::new(1000, Duration::seconds(300)));
        build_service_with_store(store, max_issuances)
    }

    fn build_service_with_store(
        store: Arc<dyn SessionStore>,
        max_issuances: u32,
    ) -> (CredentialsService, Arc<MemoryAuditStorage>) {
        let config = SessionConfig {
            token_secret: String::from_utf8(SECRET.to_vec()).unwrap(),
            ..Default::default()
        };
        let issuer = Arc::new(SessionIssuer::new(
            store,
            Arc::new(UserSessionIndex::new()),
            Arc::new(SlidingWindowRateLimiter::new(max_issuances, 60)),
            TokenCodec::new(SECRET).unwrap(),
            Arc::new(ManualClock::at_epoch()),
            config,
        ));
        let storage = Arc::new(MemoryAuditStorage::new());
        let (audit, _handle) = AuditLogger::spawn(storage.clone(), 64);
        (CredentialsService::new(issuer, audit), storage)
    }

    /// Store whose writes take longer than a short caller deadline
    struct SlowStore {
        inner: MemorySessionStore,
        delay: StdDuration,
    }

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn put(&self, session: Session) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.put(session).await
        }

        async fn get(&self, token: &SessionToken) -> Result<Session, StoreError> {
            self.inner.get(token).await
        }

        async fn revoke(&self, token: &SessionToken) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.revoke(token).await
        }

        async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
            self.inner.sweep(now).await
        }

        async fn len(&self) -> usize {
            self.inner.len().await
        }
    }

    async fn wait_for_audit(
        storage: &MemoryAuditStorage,
        query: AuditQuery,
        expected: usize,
    ) -> usize {
        for _ in 0..50 {
            let found = storage.query(query.clone()).await.unwrap().len();
            if found >= expected {
                return found;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        storage.query(query).await.unwrap().len()
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("677c6781-a760-4baf-9269-1311454d34e3").is_ok());
        assert!(validate_user_id("alice@example.com").is_ok());
        assert!(validate_user_id("svc:worker_1.prod").is_ok());
        assert!(validate_user_id(&"a".repeat(MAX_USER_ID_LEN)).is_ok());

        assert!(matches!(
            validate_user_id(""),
            Err(ServiceError::InvalidArgument(_))
        ));
        assert!(validate_user_id(&"a".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert!(validate_user_id("bad user").is_err());
        assert!(validate_user_id("user/123").is_err());
        assert!(validate_user_id("usér").is_err());
    }

    #[tokio::test]
    async fn test_get_session_reuses_and_audits() {
        let (service, storage) = build_service(10);

        let first = service.get_session("user-123", Some("req-1")).await.unwrap();
        let second = service.get_session("user-123", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.user_id, "user-123");

        let issued = AuditQuery {
            action: Some(AuditAction::SessionIssued),
            ..Default::default()
        };
        let reused = AuditQuery {
            action: Some(AuditAction::SessionReused),
            ..Default::default()
        };
        assert_eq!(wait_for_audit(&storage, issued, 1).await, 1);
        assert_eq!(wait_for_audit(&storage, reused, 1).await, 1);
    }

    #[tokio::test]
    async fn test_get_session_rejects_bad_user_id() {
        let (service, _) = build_service(10);
        let result = service.get_session("", None).await;
        assert!(matches!(result, Err(ServiceError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_rate_limited_is_reported_and_audited() {
        let (service, storage) = build_service(1);

        let first = service.get_session("user-123", None).await.unwrap();
        let token = SessionToken::from_base64(&first.token).unwrap();
        service.issuer().revoke(&token).await.unwrap();

        let result = service.get_session("user-123", None).await;
        assert_eq!(
            result,
            Err(ServiceError::RateLimited {
                retry_after_secs: 60
            })
        );

        let query = AuditQuery {
            action: Some(AuditAction::RateLimitExceeded),
            ..Default::default()
        };
        assert_eq!(wait_for_audit(&storage, query, 1).await, 1);
    }

    #[tokio::test]
    async fn test_resolve_and_revoke() {
        let (service, _) = build_service(10);
        let issued = service.get_session("user-123", None).await.unwrap();

        let resolved = service.resolve_session(&issued.token).await.unwrap();
        assert_eq!(resolved.user_id, "user-123");
        assert_eq!(resolved.expires_at, issued.expires_at);

        service.revoke_session(&issued.token, None).await.unwrap();
        assert_eq!(
            service.resolve_session(&issued.token).await,
            Err(ServiceError::NotFound)
        );

        // Idempotent
        service.revoke_session(&issued.token, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_garbage_and_forged_tokens_look_unknown() {
        let (service, storage) = build_service(10);

        assert_eq!(
            service.resolve_session("not base64 at all!").await,
            Err(ServiceError::NotFound)
        );

        let forged = TokenCodec::new(b"another-secret-another-secret-xx")
            .unwrap()
            .encode(42)
            .to_base64();
        assert_eq!(
            service.revoke_session(&forged, None).await,
            Err(ServiceError::NotFound)
        );

        let query = AuditQuery {
            action: Some(AuditAction::InvalidTokenPresented),
            ..Default::default()
        };
        assert_eq!(wait_for_audit(&storage, query, 2).await, 2);
    }

    #[tokio::test]
    async fn test_abandoned_callers_still_get_audited() {
        let store = Arc::new(SlowStore {
            inner: MemorySessionStore::new(1000, Duration::seconds(300)),
            delay: StdDuration::from_millis(100),
        });
        let (service, storage) = build_service_with_store(store.clone(), 10);

        let abandoned = tokio::time::timeout(
            StdDuration::from_millis(10),
            service.get_session("user-1", Some("req-slow")),
        )
        .await;
        assert!(abandoned.is_err());

        let issued = AuditQuery {
            action: Some(AuditAction::SessionIssued),
            ..Default::default()
        };
        assert_eq!(wait_for_audit(&storage, issued, 1).await, 1);
        assert_eq!(store.len().await, 1);

        let session = service.get_session("user-1", None).await.unwrap();
        let abandoned = tokio::time::timeout(
            StdDuration::from_millis(10),
            service.revoke_session(&session.token, Some("req-slow")),
        )
        .await;
        assert!(abandoned.is_err());

        let revoked = AuditQuery {
            action: Some(AuditAction::SessionRevoked),
            ..Default::default()
        };
        assert_eq!(wait_for_audit(&storage, revoked.clone(), 1).await, 1);
        let records = storage.query(revoked).await.unwrap();
        assert_eq!(records[0].request_id.as_deref(), Some("req-slow"));
    }
}
