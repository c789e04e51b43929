use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{MessageRecord, UserRecord};

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub removals: u64,
    pub total_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_removal(&mut self) {
        self.removals += 1;
    }
}

/// In-process cache of message records keyed by message id.
///
/// Eviction is explicit only: an entry stays, and repeated gets return the
/// identical `Arc` instance, until `remove` or `clear`. Consumers rely on
/// that reference identity to detect freshness, so no TTL or capacity-based
/// eviction is applied.
#[derive(Clone, Default)]
pub struct MessageCache {
    entries: Arc<RwLock<HashMap<u64, Arc<MessageRecord>>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<Arc<MessageRecord>> {
        let entries = self.entries.read();
        let mut stats = self.stats.write();

        match entries.get(&id) {
            Some(record) => {
                stats.record_hit();
                Some(Arc::clone(record))
            }
            None => {
                stats.record_miss();
                None
            }
        }
    }

    pub fn insert(&self, id: u64, record: Arc<MessageRecord>) {
        let mut entries = self.entries.write();
        entries.insert(id, record);
        self.stats.write().total_entries = entries.len();
    }

    pub fn remove(&self, id: u64) -> Option<Arc<MessageRecord>> {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let removed = entries.remove(&id);
        if removed.is_some() {
            stats.record_removal();
        }
        stats.total_entries = entries.len();
        removed
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.stats.write().total_entries = 0;
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

/// In-process cache of user aggregates, keyed by user id in its own
/// namespace so user and message ids sharing numeric space never collide.
#[derive(Clone, Default)]
pub struct UserCache {
    entries: Arc<RwLock<HashMap<u64, Arc<UserRecord>>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<Arc<UserRecord>> {
        let entries = self.entries.read();
        let mut stats = self.stats.write();

        match entries.get(&id) {
            Some(record) => {
                stats.record_hit();
                Some(Arc::clone(record))
            }
            None => {
                stats.record_miss();
                None
            }
        }
    }

    pub fn insert(&self, id: u64, record: Arc<UserRecord>) {
        let mut entries = self.entries.write();
        entries.insert(id, record);
        self.stats.write().total_entries = entries.len();
    }

    pub fn remove(&self, id: u64) -> Option<Arc<UserRecord>> {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        let removed = entries.remove(&id);
        if removed.is_some() {
            stats.record_removal();
        }
        stats.total_entries = entries.len();
        removed
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.stats.write().total_entries = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

/// Combined cache handle shared by every engine clone.
#[derive(Clone, Default)]
pub struct RecordCache {
    pub messages: MessageCache,
    pub users: UserCache,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_all(&self) {
        self.messages.clear();
        self.users.clear();
    }

    pub fn combined_stats(&self) -> (CacheStats, CacheStats) {
        (self.messages.stats(), self.users.stats())
    }
}
