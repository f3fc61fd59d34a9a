// Session issuance policy: reuse, per-user cap, rate limit, and minting

use super::index::{IndexedToken, UserSessionIndex};
use super::storage::SessionStore;
use super::token::{SessionToken, TokenCodec};
use super::types::{Session, SessionConfig};
use crate::clock::Clock;
use crate::error::{IssueError, StoreError};
use crate::metrics;
use crate::rate_limit::RateLimiter;
use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of a successful `issue_or_renew`
#[derive(Debug, Clone)]
pub struct Issuance {
    pub session: Session,
    /// True when an existing live session was returned instead of minting
    pub reused: bool,
}

/// Counters from one maintenance pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub swept: usize,
    pub reconciled: usize,
    pub pruned_windows: usize,
    pub pruned_locks: usize,
}

/// Owns session creation and renewal.
///
/// All mutations for one user happen inside that user's critical section, so
/// concurrent requests for the same user observe a single mint.
pub struct SessionIssuer {
    store: Arc<dyn SessionStore>,
    index: Arc<UserSessionIndex>,
    limiter: Arc<dyn RateLimiter>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionIssuer {
    pub fn new(
        store: Arc<dyn SessionStore>,
        index: Arc<UserSessionIndex>,
        limiter: Arc<dyn RateLimiter>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            index,
            limiter,
            codec,
            clock,
            config,
            user_locks: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Return the user's current session, or mint a new one
    pub async fn issue_or_renew(&self, user_id: &str) -> Result<Issuance, IssueError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let live = self.live_sessions(user_id, now).await?;

        if let Some(newest) = live.last()
            && !newest.expires_within(now, self.config.renew_before())
        {
            debug!(
                "Reusing session {} for user {}",
                newest.token.fingerprint(),
                user_id
            );
            metrics::record_session_reused();
            return Ok(Issuance {
                session: newest.clone(),
                reused: true,
            });
        }

        if let Err(retry_after_secs) = self.limiter.check_rate_limit(user_id, now).await {
            warn!(
                "User {} exceeded issuance rate, retry after {}s",
                user_id, retry_after_secs
            );
            metrics::record_rate_limit_hit();
            return Err(IssueError::RateLimited { retry_after_secs });
        }

        let session = match self.evict_and_mint(user_id, live, now).await {
            Ok(session) => session,
            Err(e) => {
                // The budget only covers sessions that were actually issued
                self.limiter.release(user_id, now).await;
                return Err(e);
            }
        };
        self.index.register(user_id, IndexedToken::from(&session));
        metrics::record_session_issued();

        info!(
            "Issued session {} for user {}, expires at {}",
            session.token.fingerprint(),
            user_id,
            session.expires_at
        );

        Ok(Issuance {
            session,
            reused: false,
        })
    }

    /// Revoke the oldest sessions down to the per-user cap, then mint
    async fn evict_and_mint(
        &self,
        user_id: &str,
        mut live: Vec<Session>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Session, IssueError> {
        while live.len() >= self.config.max_sessions_per_user {
            let oldest = live.remove(0);
            info!(
                "User {} has reached max concurrent sessions ({}), revoking oldest session {}",
                user_id,
                self.config.max_sessions_per_user,
                oldest.token.fingerprint()
            );
            match self.with_retry(|| self.store.revoke(&oldest.token)).await {
                Ok(()) | Err(StoreError::NotFound) => {}
                Err(e) => return Err(e.into()),
            }
            self.index.remove(user_id, &oldest.token);
            metrics::record_session_revoked("session_limit");
        }

        self.mint(user_id, now).await
    }

    /// Look up the live session behind a token
    pub async fn resolve(&self, token: &SessionToken) -> Result<Session, IssueError> {
        self.codec.decode(token.as_bytes())?;

        let session = self.with_retry(|| self.store.get(token)).await?;
        let now = self.clock.now();
        if !session.is_live(now) {
            debug!(
                "Session {} is {:?}, not resolvable",
                token.fingerprint(),
                session.status(now)
            );
            return Err(IssueError::NotFound);
        }
        Ok(session)
    }

    /// Revoke the session behind a token. Revoked is terminal.
    pub async fn revoke(&self, token: &SessionToken) -> Result<Session, IssueError> {
        self.codec.decode(token.as_bytes())?;

        let session = self.with_retry(|| self.store.get(token)).await?;

        let lock = self.user_lock(&session.user_id);
        let _guard = lock.lock().await;

        self.with_retry(|| self.store.revoke(token)).await?;
        self.index.remove(&session.user_id, token);
        metrics::record_session_revoked("explicit");

        info!(
            "Revoked session {} for user {}",
            token.fingerprint(),
            session.user_id
        );

        let mut revoked = session;
        revoked.revoke();
        Ok(revoked)
    }

    /// Sweep expired records, reconcile the user index and drop idle per-user state
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, IssueError> {
        let now = self.clock.now();

        let swept = self.with_retry(|| self.store.sweep(now)).await?;
        let reconciled = self.index.reconcile(self.store.as_ref(), now).await?;
        let pruned_windows = self.limiter.prune(now).await;
        let pruned_locks = self.prune_idle_locks();

        metrics::record_stored_sessions(self.store.len().await);

        Ok(MaintenanceReport {
            swept,
            reconciled,
            pruned_windows,
            pruned_locks,
        })
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Remove lock entries nobody is holding or waiting on
    fn prune_idle_locks(&self) -> usize {
        let before = self.user_locks.len();
        self.user_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.user_locks.len())
    }

    /// Live sessions for a user, oldest first. Drops stale index entries on the way.
    async fn live_sessions(
        &self,
        user_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Session>, IssueError> {
        let mut live = Vec::new();

        for indexed in self.index.tokens(user_id) {
            match self.with_retry(|| self.store.get(&indexed.token)).await {
                Ok(session) if session.is_live(now) => live.push(session),
                Ok(_) | Err(StoreError::NotFound) => {
                    self.index.remove(user_id, &indexed.token);
                }
                Err(e) => {
                    error!("Failed to load session for user {}: {}", user_id, e);
                    return Err(e.into());
                }
            }
        }

        Ok(live)
    }

    async fn mint(
        &self,
        user_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Session, IssueError> {
        // A duplicate 128-bit id is not expected; one fresh attempt is enough
        for _ in 0..2 {
            let session_id = random_session_id();
            let token = self.codec.encode(session_id);
            let session = Session::new(
                token,
                session_id,
                user_id.to_string(),
                now,
                self.config.ttl(),
            );

            match self.with_retry(|| self.store.put(session.clone())).await {
                Ok(()) => return Ok(session),
                Err(StoreError::DuplicateToken) => {
                    warn!("Minted token collided with an existing session, retrying");
                }
                Err(e) => {
                    error!("Failed to persist session for user {}: {}", user_id, e);
                    return Err(e.into());
                }
            }
        }

        Err(IssueError::Internal(
            "could not mint a unique session token".to_string(),
        ))
    }

    /// Run a store call, retrying once after a short delay on transient faults
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match op().await {
            Err(e) if e.is_transient() => {
                warn!("Session store call failed ({}), retrying once", e);
                tokio::time::sleep(StdDuration::from_millis(self.config.store_retry_delay_ms))
                    .await;
                op().await
            }
            other => other,
        }
    }
}

fn random_session_id() -> u128 {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    u128::from_be_bytes(bytes)
}
