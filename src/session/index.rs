// Secondary index from user id to that user's session tokens
//
// Entries are weak references: the store owns the records. Stale entries are
// dropped lazily by the issuer and in bulk by `reconcile`.

use super::storage::SessionStore;
use super::token::SessionToken;
use super::types::Session;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedToken {
    pub token: SessionToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for IndexedToken {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Default)]
pub struct UserSessionIndex {
    entries: DashMap<String, Vec<IndexedToken>>,
}

impl UserSessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, entry: IndexedToken) {
        let mut tokens = self.entries.entry(user_id.to_string()).or_default();
        if !tokens.iter().any(|t| t.token == entry.token) {
            tokens.push(entry);
        }
    }

    /// The user's indexed tokens, oldest first
    pub fn tokens(&self, user_id: &str) -> Vec<IndexedToken> {
        let mut tokens = self
            .entries
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        tokens.sort_by(|a, b| a.issued_at.cmp(&b.issued_at));
        tokens
    }

    pub fn remove(&self, user_id: &str, token: &SessionToken) {
        self.entries.remove_if_mut(user_id, |_, tokens| {
            tokens.retain(|t| &t.token != token);
            tokens.is_empty()
        });
    }

    pub fn user_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry that no longer resolves to a live session.
    /// Returns the number of entries removed.
    pub async fn reconcile(
        &self,
        store: &dyn SessionStore,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let snapshot: Vec<(String, Vec<IndexedToken>)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (user_id, tokens) in snapshot {
            for indexed in tokens {
                let stale = if indexed.expires_at <= now {
                    true
                } else {
                    match store.get(&indexed.token).await {
                        Ok(session) => !session.is_live(now),
                        Err(StoreError::NotFound) => true,
                        Err(e) => return Err(e),
                    }
                };

                if stale {
                    self.remove(&user_id, &indexed.token);
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!("Reconciled user index, dropped {} stale entries", removed);
        }

        Ok(removed)
    }
}
