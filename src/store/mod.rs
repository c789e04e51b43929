pub mod cache;
pub mod engine;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;

/// Composite key helpers for the external key-value store. Keys combine the
/// entity-type name with the identifier so messages and users never collide
/// despite sharing the numeric id space.
pub struct Key;

impl Key {
    /// Index key under which every stored message id is enumerated.
    pub const MESSAGE_INDEX: &'static str = "messages";

    pub fn message(id: u64) -> String {
        format!("message:{}", id)
    }

    pub fn user(id: u64) -> String {
        format!("user:{}", id)
    }

    /// Ordered list of message ids attributed to a user.
    pub fn user_messages(id: u64) -> String {
        format!("user-messages:{}", id)
    }
}

/// Contract of the external key-value store: opaque records by composite
/// key, ordered id-lists, and named counters.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a record, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a record, overwriting any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a record. Absent keys are not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Append an id to the list associated with `key`.
    async fn append_to_list(&self, key: &str, id: u64) -> Result<()>;

    /// Enumerate a list in append order; empty when the key is absent.
    async fn list(&self, key: &str) -> Result<Vec<u64>>;

    /// Enumerate every id recorded under an index key.
    async fn all_ids(&self, index_key: &str) -> Result<Vec<u64>> {
        self.list(index_key).await
    }

    /// Atomically increment a named counter, returning the new value.
    async fn incr_counter(&self, name: &str) -> Result<u64>;

    /// Read a named counter; zero when it was never incremented.
    async fn read_counter(&self, name: &str) -> Result<u64>;
}

/// In-memory store backend for tests and development runs.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
    lists: RwLock<HashMap<String, Vec<u64>>>,
    counters: RwLock<HashMap<String, u64>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_count(&self) -> usize {
        self.records.read().len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn append_to_list(&self, key: &str, id: u64) -> Result<()> {
        self.lists.write().entry(key.to_string()).or_default().push(id);
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<u64>> {
        Ok(self.lists.read().get(key).cloned().unwrap_or_default())
    }

    async fn incr_counter(&self, name: &str) -> Result<u64> {
        let mut counters = self.counters.write();
        let value = counters.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn read_counter(&self, name: &str) -> Result<u64> {
        Ok(self.counters.read().get(name).copied().unwrap_or(0))
    }
}
