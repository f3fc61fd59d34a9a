// Session storage backends

use super::token::SessionToken;
use super::types::Session;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Trait for session storage backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session
    async fn put(&self, session: Session) -> Result<(), StoreError>;

    /// Get a session by token
    async fn get(&self, token: &SessionToken) -> Result<Session, StoreError>;

    /// Mark a session as revoked
    async fn revoke(&self, token: &SessionToken) -> Result<(), StoreError>;

    /// Remove every session whose expiry plus grace period lies before `now`
    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Number of stored records
    async fn len(&self) -> usize;
}

/// In-memory session store.
///
/// Records live in a sharded map so writers on distinct tokens do not contend.
/// A separate expiry index, ordered by `expires_at`, lets the sweep find
/// expired records without scanning the table.
pub struct MemorySessionStore {
    records: DashMap<SessionToken, Session>,
    expiry_index: Mutex<BTreeMap<DateTime<Utc>, Vec<SessionToken>>>,
    count: AtomicUsize,
    capacity: usize,
    grace: Duration,
}

impl MemorySessionStore {
    pub fn new(capacity: usize, grace: Duration) -> Self {
        Self {
            records: DashMap::new(),
            expiry_index: Mutex::new(BTreeMap::new()),
            count: AtomicUsize::new(0),
            capacity,
            grace,
        }
    }

    fn reserve_slot(&self) -> Result<(), StoreError> {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        if previous >= self.capacity {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return Err(StoreError::StorageFull);
        }
        Ok(())
    }

    fn index_expiry(&self, expires_at: DateTime<Utc>, token: SessionToken) {
        let mut index = self
            .expiry_index
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        index.entry(expires_at).or_default().push(token);
    }

    /// Detach every index bucket strictly older than `cutoff`
    fn take_expired(&self, cutoff: DateTime<Utc>) -> BTreeMap<DateTime<Utc>, Vec<SessionToken>> {
        let mut index = self
            .expiry_index
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let live = index.split_off(&cutoff);
        std::mem::replace(&mut *index, live)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, session: Session) -> Result<(), StoreError> {
        self.reserve_slot()?;

        let token = session.token;
        let expires_at = session.expires_at;

        match self.records.entry(token) {
            Entry::Occupied(_) => {
                self.count.fetch_sub(1, Ordering::AcqRel);
                return Err(StoreError::DuplicateToken);
            }
            Entry::Vacant(slot) => {
                debug!(
                    "Storing session {} for user {}",
                    token.fingerprint(),
                    session.user_id
                );
                slot.insert(session);
            }
        }

        self.index_expiry(expires_at, token);
        Ok(())
    }

    async fn get(&self, token: &SessionToken) -> Result<Session, StoreError> {
        self.records
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn revoke(&self, token: &SessionToken) -> Result<(), StoreError> {
        match self.records.get_mut(token) {
            Some(mut entry) => {
                entry.value_mut().revoke();
                debug!("Revoked session {}", token.fingerprint());
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let expired = self.take_expired(now - self.grace);

        let mut removed = 0;
        for token in expired.into_values().flatten() {
            let grace = self.grace;
            if self
                .records
                .remove_if(&token, |_, session| session.is_collectable(now, grace))
                .is_some()
            {
                self.count.fetch_sub(1, Ordering::AcqRel);
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {} expired sessions", removed);
        }

        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::token::TokenCodec;
    use std::sync::Arc;

    fn epoch_plus(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(secs)
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    fn session(id: u128, user_id: &str, issued_secs: i64, ttl_secs: i64) -> Session {
        Session::new(
            codec().encode(id),
            id,
            user_id.to_string(),
            epoch_plus(issued_secs),
            Duration::seconds(ttl_secs),
        )
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemorySessionStore::new(10, Duration::seconds(60));
        let session = session(1, "user-123", 0, 3600);
        let token = session.token;

        store.put(session.clone()).await.unwrap();

        let retrieved = store.get(&token).await.unwrap();
        assert_eq!(retrieved, session);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemorySessionStore::new(10, Duration::seconds(60));
        let token = codec().encode(77);
        assert_eq!(store.get(&token).await, Err(StoreError::NotFound));
        assert_eq!(store.revoke(&token).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_duplicate_token_is_rejected() {
        let store = MemorySessionStore::new(10, Duration::seconds(60));
        store.put(session(1, "user-a", 0, 3600)).await.unwrap();

        let result = store.put(session(1, "user-b", 5, 3600)).await;
        assert_eq!(result, Err(StoreError::DuplicateToken));
        assert_eq!(store.len().await, 1);

        let kept = store.get(&codec().encode(1)).await.unwrap();
        assert_eq!(kept.user_id, "user-a");
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let store = MemorySessionStore::new(2, Duration::seconds(60));
        store.put(session(1, "u", 0, 3600)).await.unwrap();
        store.put(session(2, "u", 0, 3600)).await.unwrap();

        assert_eq!(
            store.put(session(3, "u", 0, 3600)).await,
            Err(StoreError::StorageFull)
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_revoke_marks_session() {
        let store = MemorySessionStore::new(10, Duration::seconds(60));
        let session = session(1, "user-123", 0, 3600);
        let token = session.token;
        store.put(session).await.unwrap();

        store.revoke(&token).await.unwrap();
        let revoked = store.get(&token).await.unwrap();
        assert!(revoked.revoked);
        assert!(!revoked.is_live(epoch_plus(1)));

        // Revoking again is harmless
        store.revoke(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_respects_grace_period() {
        let store = MemorySessionStore::new(10, Duration::seconds(300));
        let short = session(1, "user-123", 0, 100);
        let long = session(2, "user-123", 0, 10_000);
        store.put(short.clone()).await.unwrap();
        store.put(long.clone()).await.unwrap();

        // Expired but still inside the grace period
        assert_eq!(store.sweep(epoch_plus(400)).await.unwrap(), 0);
        assert!(store.get(&short.token).await.is_ok());

        assert_eq!(store.sweep(epoch_plus(401)).await.unwrap(), 1);
        assert_eq!(store.get(&short.token).await, Err(StoreError::NotFound));
        assert!(store.get(&long.token).await.is_ok());
        assert_eq!(store.len().await, 1);

        // Freed capacity is reusable and a second sweep is a no-op
        assert_eq!(store.sweep(epoch_plus(401)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_revoked_sessions_once_expired() {
        let store = MemorySessionStore::new(10, Duration::seconds(0));
        let session = session(1, "user-123", 0, 100);
        let token = session.token;
        store.put(session).await.unwrap();
        store.revoke(&token).await.unwrap();

        assert_eq!(store.sweep(epoch_plus(50)).await.unwrap(), 0);
        assert_eq!(store.sweep(epoch_plus(101)).await.unwrap(), 1);
        assert_eq!(store.get(&token).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_concurrent_puts_for_distinct_tokens() {
        let store = Arc::new(MemorySessionStore::new(1000, Duration::seconds(60)));

        let mut handles = Vec::new();
        for i in 0..100u128 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put(session(i, "user-123", 0, 3600)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.len().await, 100);
        for i in 0..100u128 {
            assert!(store.get(&codec().encode(i)).await.is_ok());
        }
    }
}
