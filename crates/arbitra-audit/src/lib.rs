//! Arbitra Audit - Append-only event journal
//!
//! Every committed protocol event is journaled. Entries are hash-chained so
//! that an exported journal can be verified offline, and each append is
//! fanned out to live subscribers (indexers, notifiers). A slow or absent
//! subscriber never blocks or fails an append.

use std::sync::Arc;

use arbitra_types::ProtocolEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Hash preceding the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors from the audit journal
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit entry {sequence} not found")]
    NotFound { sequence: u64 },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// A journaled protocol event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the journal, starting at 0
    pub sequence: u64,
    /// Hash of the previous entry (for chain)
    pub previous_hash: String,
    /// Entry hash
    pub hash: String,
    /// Wall-clock time the entry was written
    pub recorded_at: DateTime<Utc>,
    pub event: ProtocolEvent,
}

impl AuditEntry {
    fn new(sequence: u64, previous_hash: String, event: ProtocolEvent) -> Result<Self> {
        let mut entry = Self {
            sequence,
            previous_hash,
            hash: String::new(),
            recorded_at: Utc::now(),
            event,
        };
        entry.hash = entry.compute_hash()?;
        Ok(entry)
    }

    /// Compute hash of this entry
    pub fn compute_hash(&self) -> Result<String> {
        let body = serde_json::to_vec(&self.event).map_err(|e| AuditError::Serialization {
            message: e.to_string(),
        })?;
        let mut hasher = Sha256::new();
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(b":");
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(b":");
        hasher.update(&body);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify the entry hash
    pub fn verify(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }
}

/// Audit log trait
#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an event
    async fn append(&self, event: ProtocolEvent) -> Result<AuditEntry>;

    /// Get an entry by sequence number
    async fn get(&self, sequence: u64) -> Result<AuditEntry>;

    /// Get entries whose event has the given name
    async fn get_by_name(&self, name: &str) -> Result<Vec<AuditEntry>>;

    /// Verify the chain
    async fn verify_chain(&self) -> Result<bool>;

    /// Export entries whose event timestamp lies in `[from, to]`
    async fn export(&self, from: Option<i64>, to: Option<i64>) -> Result<Vec<AuditEntry>>;
}

/// In-memory journal with live fan-out
#[derive(Clone)]
pub struct EventJournal {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    sender: broadcast::Sender<AuditEntry>,
}

impl EventJournal {
    /// Create a journal whose subscribers may lag by up to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    /// Subscribe to entries appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.sender.subscribe()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All events in order
    pub async fn events(&self) -> Vec<ProtocolEvent> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait::async_trait]
impl AuditLog for EventJournal {
    async fn append(&self, event: ProtocolEvent) -> Result<AuditEntry> {
        let mut entries = self.entries.write().await;
        let previous_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry = AuditEntry::new(entries.len() as u64, previous_hash, event)?;
        entries.push(entry.clone());

        // No receivers is fine
        let _ = self.sender.send(entry.clone());
        tracing::debug!(sequence = entry.sequence, event = entry.event.name(), "journaled");
        Ok(entry)
    }

    async fn get(&self, sequence: u64) -> Result<AuditEntry> {
        let entries = self.entries.read().await;
        usize::try_from(sequence)
            .ok()
            .and_then(|i| entries.get(i))
            .cloned()
            .ok_or(AuditError::NotFound { sequence })
    }

    async fn get_by_name(&self, name: &str) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.event.name() == name)
            .cloned()
            .collect())
    }

    async fn verify_chain(&self) -> Result<bool> {
        let entries = self.entries.read().await;
        let mut previous = GENESIS_HASH.to_string();
        for entry in entries.iter() {
            if entry.previous_hash != previous || !entry.verify() {
                tracing::warn!(sequence = entry.sequence, "audit chain broken");
                return Ok(false);
            }
            previous = entry.hash.clone();
        }
        Ok(true)
    }

    async fn export(&self, from: Option<i64>, to: Option<i64>) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| {
                let ts = e.event.timestamp();
                from.map_or(true, |f| ts >= f) && to.map_or(true, |t| ts <= t)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbitra_types::AccountId;

    fn paused(ts: i64) -> ProtocolEvent {
        ProtocolEvent::ProtocolPaused {
            admin: AccountId::new([1; 32]),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_chain_links_and_verifies() {
        let journal = EventJournal::default();
        let first = journal.append(paused(1)).await.unwrap();
        let second = journal.append(paused(2)).await.unwrap();

        assert_eq!(first.previous_hash, GENESIS_HASH);
        assert_eq!(second.previous_hash, first.hash);
        assert!(journal.verify_chain().await.unwrap());
    }

    #[tokio::test]
    async fn test_tampering_breaks_chain() {
        let journal = EventJournal::default();
        journal.append(paused(1)).await.unwrap();
        journal.append(paused(2)).await.unwrap();

        journal.entries.write().await[0].event = paused(99);
        assert!(!journal.verify_chain().await.unwrap());
    }

    #[tokio::test]
    async fn test_subscribers_receive_appends() {
        let journal = EventJournal::new(8);
        let mut rx = journal.subscribe();
        journal.append(paused(7)).await.unwrap();

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.event.timestamp(), 7);
    }

    #[tokio::test]
    async fn test_export_window() {
        let journal = EventJournal::default();
        for ts in [10, 20, 30] {
            journal.append(paused(ts)).await.unwrap();
        }
        assert_eq!(journal.export(Some(15), None).await.unwrap().len(), 2);
        assert_eq!(journal.export(Some(15), Some(25)).await.unwrap().len(), 1);
        assert!(matches!(journal.get(5).await, Err(AuditError::NotFound { sequence: 5 })));
        assert_eq!(journal.get_by_name("ProtocolPaused").await.unwrap().len(), 3);
    }
}
