//! Event Pipeline (C5): debounces and batches watcher events, then dispatches
//! each batch to the reconciliation engine with a bounded retry policy.

use crate::engine::ReconciliationEngine;
use crate::health::HealthState;
use crate::store::CatalogStore;
use crate::types::FileEvent;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

/// Bounded grace period the pipeline spends draining and flushing a final
/// partial batch once shutdown is signaled.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Tuning knobs for batch formation and retry (SPEC_FULL.md section 4.5),
/// sourced from [`crate::Config`].
#[derive(Debug, Clone, Copy)]
pub struct EventPipeline {
    pub debounce_delay: Duration,
    pub batch_timeout: Duration,
    pub max_batch_size: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl EventPipeline {
    pub fn new(
        debounce_delay: Duration,
        batch_timeout: Duration,
        max_batch_size: usize,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            debounce_delay,
            batch_timeout,
            max_batch_size,
            retry_attempts,
            retry_delay,
        }
    }

    /// Runs the consumer loop until `shutdown` reports `true`, then flushes a
    /// final partial batch within [`SHUTDOWN_GRACE_PERIOD`] before returning.
    pub async fn run<S: CatalogStore>(
        &self,
        mut events: mpsc::UnboundedReceiver<FileEvent>,
        engine: Arc<ReconciliationEngine>,
        store: Arc<S>,
        health: Arc<HealthState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                event = events.recv() => event,
            };
            let Some(first) = first else {
                break;
            };

            let batch = self.form_batch(first, &mut events, &mut shutdown).await;
            health.set_pending_events(events_len_hint(&events));
            self.dispatch_with_retry(&engine, store.as_ref(), &batch, &health)
                .await;
        }

        self.flush_on_shutdown(&mut events, &engine, store.as_ref(), &health)
            .await;
        info!("event pipeline stopped");
    }

    /// Batch formation: the anchor event is delayed by at least
    /// `debounce_delay`, then further events already queued during that
    /// sleep (plus any trickling in right after) are drained non-blockingly
    /// until either `max_batch_size` or `batch_timeout` (measured from the
    /// end of the debounce sleep, not the anchor) is hit.
    async fn form_batch(
        &self,
        anchor: FileEvent,
        events: &mut mpsc::UnboundedReceiver<FileEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Vec<FileEvent> {
        let mut batch = vec![anchor];

        tokio::select! {
            biased;
            _ = shutdown.changed() => {}
            _ = tokio::time::sleep(self.debounce_delay) => {}
        }

        let drain_start = Instant::now();
        while batch.len() < self.max_batch_size && drain_start.elapsed() < self.batch_timeout {
            match events.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        batch
    }

    #[instrument(skip(self, engine, store, health, batch), fields(batch_size = batch.len()))]
    async fn dispatch_with_retry<S: CatalogStore>(
        &self,
        engine: &ReconciliationEngine,
        store: &S,
        batch: &[FileEvent],
        health: &HealthState,
    ) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();
            match engine.apply_batch(store, batch).await {
                Ok(outcome) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    debug!(attempt, ?outcome, elapsed_ms, "batch applied");
                    health.record_batch(&outcome, elapsed_ms, Utc::now());
                    return;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "batch dispatch failed");
                    if attempt >= self.retry_attempts {
                        error!(
                            attempts = attempt,
                            events = batch.len(),
                            "batch dropped after exhausting retries; the next periodic full sync will heal the divergence"
                        );
                        health.record_dropped_batch(batch.len() as u64);
                        return;
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn flush_on_shutdown<S: CatalogStore>(
        &self,
        events: &mut mpsc::UnboundedReceiver<FileEvent>,
        engine: &ReconciliationEngine,
        store: &S,
        health: &HealthState,
    ) {
        tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;

        let mut final_batch = Vec::new();
        while let Ok(event) = events.try_recv() {
            final_batch.push(event);
        }

        if !final_batch.is_empty() {
            info!(count = final_batch.len(), "flushing final batch on shutdown");
            self.dispatch_with_retry(engine, store, &final_batch, health)
                .await;
        }
    }
}

/// Queue depth reported to the health surface: the number of events already
/// buffered in the channel, not counting whatever `form_batch` just drained
/// out of it.
fn events_len_hint(events: &mpsc::UnboundedReceiver<FileEvent>) -> u64 {
    events.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::store::memory::{MemorySession, MemoryStore};
    use crate::types::FileEventKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pipeline() -> EventPipeline {
        EventPipeline::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            3,
            2,
            Duration::from_millis(10),
        )
    }

    /// A store whose `begin()` fails the first `fail_count` times it is
    /// called, then delegates to a real in-memory store. Used to drive
    /// `dispatch_with_retry`'s retry-cap behavior (SPEC_FULL.md P7).
    struct FlakyStore {
        inner: MemoryStore,
        attempts: AtomicU32,
        fail_count: u32,
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        type Session = MemorySession;

        async fn begin(&self) -> crate::error::Result<Self::Session> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_count {
                return Err(SyncError::Database(sqlx::Error::PoolClosed));
            }
            self.inner.begin().await
        }

        async fn health(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn retry_is_capped_at_retry_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ReconciliationEngine::new(dir.path().to_path_buf()));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            attempts: AtomicU32::new(0),
            fail_count: 10,
        };
        let health = Arc::new(HealthState::new());
        let pipe = pipeline();
        let event = FileEvent::new(
            FileEventKind::Created,
            PathBuf::from("/does/not/exist.jpg"),
            "misc".to_string(),
        );

        pipe.dispatch_with_retry(&engine, &store, &[event], &health)
            .await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), pipe.retry_attempts);
        assert_eq!(health.stats().event_queue.failed_events, 1);
    }

    #[tokio::test]
    async fn succeeds_once_the_store_recovers_within_the_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ReconciliationEngine::new(dir.path().to_path_buf()));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            attempts: AtomicU32::new(0),
            fail_count: 1,
        };
        let health = Arc::new(HealthState::new());
        let pipe = pipeline();
        let event = FileEvent::new(
            FileEventKind::Deleted,
            PathBuf::from("/does/not/exist.jpg"),
            "misc".to_string(),
        );

        pipe.dispatch_with_retry(&engine, &store, &[event], &health)
            .await;

        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(health.stats().sync_statistics.files_processed_today, 1);
        assert_eq!(health.stats().event_queue.failed_events, 0);
    }

    #[tokio::test]
    async fn dispatches_a_batch_and_records_health_stats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(ReconciliationEngine::new(dir.path().to_path_buf()));
        let store = Arc::new(MemoryStore::new());
        let health = Arc::new(HealthState::new());
        let pipe = pipeline();

        let event = FileEvent::new(
            FileEventKind::Deleted,
            PathBuf::from("/does/not/exist.jpg"),
            "misc".to_string(),
        );

        pipe.dispatch_with_retry(&engine, store.as_ref(), &[event], &health)
            .await;

        let stats = health.stats();
        assert_eq!(stats.sync_statistics.files_processed_today, 1);
    }

    #[tokio::test]
    async fn form_batch_respects_max_batch_size() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..10 {
            tx.send(FileEvent::new(
                FileEventKind::Created,
                PathBuf::from(format!("/root/cat/file-{i}.jpg")),
                "cat".to_string(),
            ))
            .unwrap();
        }
        let anchor = rx.recv().await.unwrap();
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pipe = pipeline();
        let batch = pipe.form_batch(anchor, &mut rx, &mut shutdown_rx).await;
        assert_eq!(batch.len(), pipe.max_batch_size);
    }

    #[tokio::test]
    async fn form_batch_waits_at_least_the_debounce_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let anchor = FileEvent::new(
            FileEventKind::Created,
            PathBuf::from("/root/cat/only.jpg"),
            "cat".to_string(),
        );
        tx.send(anchor.clone()).unwrap();
        let anchor = rx.recv().await.unwrap();

        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pipe = pipeline();
        let started = Instant::now();
        let batch = pipe.form_batch(anchor, &mut rx, &mut shutdown_rx).await;
        assert_eq!(batch.len(), 1);
        assert!(started.elapsed() >= pipe.debounce_delay);
    }

    #[tokio::test]
    async fn form_batch_coalesces_a_burst_even_when_debounce_exceeds_batch_timeout() {
        // Mirrors the shipped defaults: debounce_delay (2s) is longer than
        // batch_timeout (1s). The drain window has to be measured from the
        // end of the debounce sleep, not the anchor, or every event in the
        // burst below would ship as its own single-event batch.
        let pipe = EventPipeline::new(
            Duration::from_millis(30),
            Duration::from_millis(10),
            100,
            2,
            Duration::from_millis(10),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..5 {
            tx.send(FileEvent::new(
                FileEventKind::Modified,
                PathBuf::from(format!("/root/cat/burst-{i}.jpg")),
                "cat".to_string(),
            ))
            .unwrap();
        }
        let anchor = rx.recv().await.unwrap();

        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let batch = pipe.form_batch(anchor, &mut rx, &mut shutdown_rx).await;
        assert_eq!(batch.len(), 5);
    }
}
