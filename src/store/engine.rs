use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{
    IncomingMessage, Message, MessageRecord, User, UserRecord, COUNTER_ALL, COUNTER_USERS,
};
use crate::store::cache::RecordCache;
use crate::store::{Key, KeyValueStore, MemoryKeyValueStore};

/// Result of a save: whether the message was newly stored or already known.
/// A duplicate is a successful no-op, observable only through the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Stored,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Resolve `retweet_of` links into nested records on load.
    pub resolve_retweets: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resolve_retweets: true,
        }
    }
}

#[derive(Debug, Default)]
struct EngineMetrics {
    cache_hits: u64,
    cache_misses: u64,
    store_reads: u64,
    store_writes: u64,
    messages_stored: u64,
    duplicates_ignored: u64,
}

/// Snapshot of engine activity since construction.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub store_reads: u64,
    pub store_writes: u64,
    pub messages_stored: u64,
    pub duplicates_ignored: u64,
}

/// Orchestrates saves and loads against the key-value store while keeping
/// the in-process record cache consistent. Cheap to clone; all clones share
/// the same store, cache, and metrics.
#[derive(Clone)]
pub struct PersistenceEngine {
    store: Arc<dyn KeyValueStore>,
    cache: RecordCache,
    settings: EngineSettings,
    metrics: Arc<parking_lot::RwLock<EngineMetrics>>,
}

impl PersistenceEngine {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            cache: RecordCache::new(),
            settings,
            metrics: Arc::new(parking_lot::RwLock::new(EngineMetrics::default())),
        }
    }

    pub fn with_memory_store() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()), EngineSettings::default())
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    pub fn stats(&self) -> EngineStats {
        let metrics = self.metrics.read();
        EngineStats {
            cache_hits: metrics.cache_hits,
            cache_misses: metrics.cache_misses,
            store_reads: metrics.store_reads,
            store_writes: metrics.store_writes,
            messages_stored: metrics.messages_stored,
            duplicates_ignored: metrics.duplicates_ignored,
        }
    }

    /// Persist an incoming message, its embedded retweeted original first if
    /// one is present and not yet stored.
    ///
    /// Saves are idempotent per message id: an id already in the store is a
    /// no-op with no counter change and no re-link. For a new id the record
    /// write always precedes the list appends that reference it, so a
    /// partial failure can never leave a dangling link.
    pub async fn save_message(&self, incoming: &IncomingMessage) -> Result<SaveOutcome> {
        self.metrics.write().store_reads += 1;
        if self.store.get(&Key::message(incoming.id)).await?.is_some() {
            debug!(id = incoming.id, "duplicate message ignored");
            self.metrics.write().duplicates_ignored += 1;
            return Ok(SaveOutcome::Duplicate);
        }

        if let Some(original) = &incoming.retweeted_status {
            Box::pin(self.save_message(original)).await?;
        }

        let message = incoming.to_message();
        let payload = serde_json::to_vec(&message)?;
        self.metrics.write().store_writes += 1;
        self.store.set(&Key::message(message.id), payload).await?;

        let user_key = Key::user(message.user_id);
        self.metrics.write().store_reads += 1;
        let first_message_for_user = self.store.get(&user_key).await?.is_none();
        if first_message_for_user {
            let user = incoming.to_user();
            self.metrics.write().store_writes += 1;
            self.store.set(&user_key, serde_json::to_vec(&user)?).await?;
            self.store.incr_counter(COUNTER_USERS).await?;
        }

        self.store
            .append_to_list(&Key::user_messages(message.user_id), message.id)
            .await?;
        self.store
            .append_to_list(Key::MESSAGE_INDEX, message.id)
            .await?;
        self.store.incr_counter(COUNTER_ALL).await?;
        self.metrics.write().messages_stored += 1;

        // Populate the cache through the normal load path so the cached
        // instance is the same one later reads resolve against.
        self.load_message(message.id).await?;
        if first_message_for_user {
            self.load_user(message.user_id).await?;
        }

        debug!(
            id = message.id,
            user_id = message.user_id,
            retweet_of = message.retweet_of,
            "message stored"
        );
        Ok(SaveOutcome::Stored)
    }

    /// Load a message record, cache-first. Repeated calls with no
    /// invalidation in between return the identical cached instance.
    pub async fn load_message(&self, id: u64) -> Result<Arc<MessageRecord>> {
        if let Some(record) = self.cache.messages.get(id) {
            self.metrics.write().cache_hits += 1;
            return Ok(record);
        }
        self.metrics.write().cache_misses += 1;

        self.metrics.write().store_reads += 1;
        let payload = self
            .store
            .get(&Key::message(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", id)))?;
        let message: Message = serde_json::from_slice(&payload)?;

        let retweet = match message.retweet_of {
            Some(original_id) if self.settings.resolve_retweets => {
                Some(Box::pin(self.load_message(original_id)).await?)
            }
            _ => None,
        };

        self.metrics.write().store_reads += 1;
        let user_payload = self
            .store
            .get(&Key::user(message.user_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", message.user_id)))?;
        let user: User = serde_json::from_slice(&user_payload)?;

        let record = Arc::new(MessageRecord {
            message,
            user,
            retweet,
        });
        self.cache.messages.insert(id, Arc::clone(&record));
        Ok(record)
    }

    /// Load a user aggregate, cache-first. On a miss the message list is
    /// enumerated fresh from the store and every message resolved through
    /// `load_message`, reusing cached records.
    pub async fn load_user(&self, id: u64) -> Result<Arc<UserRecord>> {
        if let Some(record) = self.cache.users.get(id) {
            self.metrics.write().cache_hits += 1;
            return Ok(record);
        }
        self.metrics.write().cache_misses += 1;

        self.metrics.write().store_reads += 1;
        let payload = self
            .store
            .get(&Key::user(id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", id)))?;
        let user: User = serde_json::from_slice(&payload)?;

        let message_ids = self.store.list(&Key::user_messages(id)).await?;
        let mut messages = Vec::with_capacity(message_ids.len());
        for message_id in message_ids {
            messages.push(self.load_message(message_id).await?);
        }

        let record = Arc::new(UserRecord { user, messages });
        self.cache.users.insert(id, Arc::clone(&record));
        Ok(record)
    }

    /// Overwrite the stored user entity and invalidate its cached aggregate
    /// so the next `load_user` rebuilds from current store state. The user's
    /// message-id list and cached message records are untouched.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        self.metrics.write().store_writes += 1;
        self.store
            .set(&Key::user(user.id), serde_json::to_vec(user)?)
            .await?;
        // Invalidation must complete before the caller observes the save.
        self.cache.users.remove(user.id);
        Ok(())
    }

    /// Lazy, ordered enumeration of every indexed message, hydrated one item
    /// at a time as the stream is polled. A failed item surfaces as a
    /// per-item `Hydration` error and the stream continues, leaving
    /// skip-vs-abort to the consumer. Each call starts a fresh enumeration.
    pub fn load_all(&self) -> BoxStream<'static, Result<Arc<MessageRecord>>> {
        let index_engine = self.clone();
        let item_engine = self.clone();

        stream::once(async move { index_engine.store.all_ids(Key::MESSAGE_INDEX).await })
            .map(|ids| match ids {
                Ok(ids) => stream::iter(ids).map(Ok::<u64, Error>).boxed(),
                Err(e) => stream::once(async move { Err::<u64, Error>(e) }).boxed(),
            })
            .flatten()
            .then(move |id| {
                let engine = item_engine.clone();
                async move {
                    let id = id?;
                    engine.load_message(id).await.map_err(|e| {
                        warn!(id, error = %e, "failed to hydrate message");
                        Error::Hydration {
                            id,
                            reason: e.to_string(),
                        }
                    })
                }
            })
            .boxed()
    }

    /// Current value of the global message counter.
    pub async fn count_all(&self) -> Result<u64> {
        self.store.read_counter(COUNTER_ALL).await
    }

    /// Number of distinct users that ever received at least one message.
    pub async fn count_users(&self) -> Result<u64> {
        self.store.read_counter(COUNTER_USERS).await
    }
}
