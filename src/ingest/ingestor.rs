use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::ingest::parser::ItemParser;
use crate::ingest::source::FeedSource;
use crate::model::IncomingMessage;
use crate::store::engine::PersistenceEngine;

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Fixed delay before reconnecting after a transport failure or a
    /// feed-initiated end of stream.
    pub reconnect_delay: Duration,
    /// Number of worker tasks draining the save queue.
    pub workers: usize,
    /// Bound of the save queue. A full queue backpressures the receive loop
    /// instead of spawning unbounded concurrent saves.
    pub queue_depth: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(500),
            workers: 4,
            queue_depth: 1024,
        }
    }
}

/// Long-running consumer of the upstream feed.
///
/// `run` connects, forwards each item to the persistence workers, and on any
/// transport failure waits the reconnect delay and tries again, indefinitely,
/// until `stop` clears the active flag. Item-level failures (unparsable
/// payloads, failed saves) are logged and never propagate to the feed loop.
pub struct StreamIngestor {
    source: Arc<dyn FeedSource>,
    engine: PersistenceEngine,
    parser: ItemParser,
    settings: IngestSettings,
    active: AtomicBool,
    received: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

impl StreamIngestor {
    pub fn new(
        source: Arc<dyn FeedSource>,
        engine: PersistenceEngine,
        settings: IngestSettings,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            source,
            engine,
            parser: ItemParser::new(),
            settings,
            active: AtomicBool::new(false),
            received: AtomicU64::new(0),
            stop_tx,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Items received from the feed so far, parsable or not.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Request the receive loop to exit. Idempotent, callable from any task;
    /// a no-op when no run is in flight. In-flight saves complete.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(true);
    }

    /// Run the ingestion loop until `stop` is called. Returns an error only
    /// when already active; feed faults are contained and retried.
    pub async fn run(&self) -> Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("ingestor already active".to_string()));
        }
        self.stop_tx.send_replace(false);
        let mut stopped = self.stop_tx.subscribe();

        info!(workers = self.settings.workers, "ingestor starting");

        let (queue_tx, queue_rx) = mpsc::channel::<IncomingMessage>(self.settings.queue_depth);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let mut workers = Vec::with_capacity(self.settings.workers);
        for worker in 0..self.settings.workers {
            let engine = self.engine.clone();
            let queue_rx = Arc::clone(&queue_rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let item = { queue_rx.lock().await.recv().await };
                    let Some(item) = item else { break };
                    if let Err(e) = engine.save_message(&item).await {
                        warn!(worker, id = item.id, error = %e, "failed to persist message");
                    }
                }
            }));
        }

        while self.is_active() {
            match self.source.connect().await {
                Ok(mut conn) => {
                    info!("feed connected");
                    loop {
                        if !self.is_active() {
                            conn.shutdown().await;
                            break;
                        }
                        tokio::select! {
                            _ = stopped.changed() => {
                                conn.shutdown().await;
                                break;
                            }
                            item = conn.receive() => match item {
                                Ok(Some(raw)) => {
                                    self.received.fetch_add(1, Ordering::Relaxed);
                                    match self.parser.parse(&raw) {
                                        Ok(incoming) => {
                                            if queue_tx.send(incoming).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(e) => {
                                            warn!(error = %e, "discarding unparsable feed item")
                                        }
                                    }
                                }
                                Ok(None) => {
                                    info!("feed closed the stream");
                                    break;
                                }
                                Err(e) => {
                                    warn!(error = %e, "feed transport error");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => error!(error = %e, "failed to connect to feed"),
            }

            if self.is_active() {
                debug!(
                    delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                    "reconnecting after delay"
                );
                tokio::select! {
                    _ = sleep(self.settings.reconnect_delay) => {}
                    _ = stopped.changed() => {}
                }
            }
        }

        // Let queued saves drain before reporting the loop stopped.
        drop(queue_tx);
        for worker in workers {
            let _ = worker.await;
        }

        self.active.store(false, Ordering::SeqCst);
        info!(received = self.received(), "ingestor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::source::FeedConnection;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Source replaying a fixed set of items once, then idling forever.
    struct ScriptedSource {
        items: Vec<String>,
        connects: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(items: Vec<String>) -> Self {
            Self {
                items,
                connects: AtomicUsize::new(0),
            }
        }
    }

    struct ScriptedConnection {
        items: Vec<String>,
        first_connect: bool,
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn connect(&self) -> Result<Box<dyn FeedConnection>> {
            let first = self.connects.fetch_add(1, Ordering::SeqCst) == 0;
            Ok(Box::new(ScriptedConnection {
                items: if first { self.items.clone() } else { Vec::new() },
                first_connect: first,
            }))
        }
    }

    #[async_trait]
    impl FeedConnection for ScriptedConnection {
        async fn receive(&mut self) -> Result<Option<String>> {
            if !self.items.is_empty() {
                return Ok(Some(self.items.remove(0)));
            }
            if self.first_connect {
                // Simulate a transport drop after the scripted items.
                self.first_connect = false;
                return Err(Error::Transport("connection reset".to_string()));
            }
            // Idle silently until the ingestor stops us.
            futures::future::pending::<()>().await;
            unreachable!()
        }

        async fn shutdown(&mut self) {}
    }

    fn ingestor_with(items: Vec<String>) -> (Arc<StreamIngestor>, PersistenceEngine) {
        let engine = PersistenceEngine::with_memory_store();
        let source = Arc::new(ScriptedSource::new(items));
        let ingestor = Arc::new(StreamIngestor::new(
            source,
            engine.clone(),
            IngestSettings {
                reconnect_delay: Duration::from_millis(10),
                workers: 2,
                queue_depth: 16,
            },
        ));
        (ingestor, engine)
    }

    fn item(id: u64, user_id: u64) -> String {
        format!(
            r#"{{"id": {}, "text": "m{}", "user": {{"id": {}, "screen_name": "u{}"}}}}"#,
            id, id, user_id, user_id
        )
    }

    #[tokio::test]
    async fn test_items_are_persisted_and_counted() {
        let (ingestor, engine) = ingestor_with(vec![
            item(1, 10),
            "{bad json".to_string(),
            item(2, 20),
        ]);

        let runner = Arc::clone(&ingestor);
        let handle = tokio::spawn(async move { runner.run().await });

        // Wait for both parsable items to land; the loop survives the
        // unparsable one and the simulated reconnect.
        for _ in 0..100 {
            if engine.count_all().await.unwrap() == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(engine.count_all().await.unwrap(), 2);
        assert_eq!(ingestor.received(), 3);

        ingestor.stop();
        handle.await.unwrap().unwrap();
        assert!(!ingestor.is_active());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (ingestor, _engine) = ingestor_with(Vec::new());
        ingestor.stop();
        ingestor.stop();
        assert!(!ingestor.is_active());
    }

    #[tokio::test]
    async fn test_start_then_immediate_stop_clears_active() {
        let (ingestor, _engine) = ingestor_with(Vec::new());

        let runner = Arc::clone(&ingestor);
        let handle = tokio::spawn(async move { runner.run().await });
        sleep(Duration::from_millis(20)).await;
        assert!(ingestor.is_active());

        ingestor.stop();
        handle.await.unwrap().unwrap();
        assert!(!ingestor.is_active());
    }

    #[tokio::test]
    async fn test_no_reconnect_after_stop() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let engine = PersistenceEngine::with_memory_store();
        let ingestor = Arc::new(StreamIngestor::new(
            Arc::clone(&source) as Arc<dyn FeedSource>,
            engine,
            IngestSettings {
                reconnect_delay: Duration::from_millis(5),
                ..Default::default()
            },
        ));

        let runner = Arc::clone(&ingestor);
        let handle = tokio::spawn(async move { runner.run().await });
        sleep(Duration::from_millis(50)).await;
        ingestor.stop();
        handle.await.unwrap().unwrap();

        let connects = source.connects.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(source.connects.load(Ordering::SeqCst), connects);
    }

    #[tokio::test]
    async fn test_second_run_while_active_is_rejected() {
        let (ingestor, _engine) = ingestor_with(Vec::new());

        let runner = Arc::clone(&ingestor);
        let handle = tokio::spawn(async move { runner.run().await });
        sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            ingestor.run().await,
            Err(Error::InvalidState(_))
        ));

        ingestor.stop();
        handle.await.unwrap().unwrap();
    }
}
