// Audit log storage backends

use super::types::{AuditEntry, AuditQuery};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait AuditStorage: Send + Sync {
    async fn store(&self, entry: AuditEntry) -> Result<(), String>;

    /// Matching entries, most recent first
    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, String>;
}

/// Append-only in-process audit trail
#[derive(Default)]
pub struct MemoryAuditStorage {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStorage for MemoryAuditStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), String> {
        debug!("Storing audit entry {} ({})", entry.id, entry.action.as_str());
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, String> {
        let entries = self.entries.read().await;
        let limit = query.limit.unwrap_or(usize::MAX);

        // Entries are appended in time order
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| query.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }
}
