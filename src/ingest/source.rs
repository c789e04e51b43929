use async_trait::async_trait;

use crate::error::Result;

/// An open connection to the upstream feed, delivering raw items one at a
/// time.
#[async_trait]
pub trait FeedConnection: Send {
    /// Receive the next raw item. `Ok(None)` signals a feed-initiated,
    /// orderly end of the stream; transport faults surface as errors.
    async fn receive(&mut self) -> Result<Option<String>>;

    /// Request the feed to halt delivery. Idempotent.
    async fn shutdown(&mut self);
}

/// Provider of feed connections. `connect` may be called repeatedly; the
/// ingestor reconnects through it after every transport failure.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FeedConnection>>;
}
