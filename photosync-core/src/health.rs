//! Health Surface (C7) data model: the counters and rolling statistics the
//! HTTP endpoints in `photosync-worker` serve, written to from the engine,
//! the pipeline, and the orchestrator.

use crate::engine::EventBatchOutcome;
use crate::types::SyncStats;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const PROCESSING_TIME_WINDOW: usize = 1_000;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub database_connected: bool,
    pub watcher_active: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SyncStatistics {
    pub files_processed_today: u64,
    pub files_added_today: u64,
    pub files_updated_today: u64,
    pub files_removed_today: u64,
    pub last_full_sync: Option<DateTime<Utc>>,
    pub average_processing_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct EventQueueStats {
    pub pending_events: u64,
    pub processed_events: u64,
    pub failed_events: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub sync_statistics: SyncStatistics,
    pub event_queue: EventQueueStats,
    pub uptime: u64,
}

#[derive(Debug)]
struct DailyCounters {
    date: NaiveDate,
    files_processed: u64,
    files_added: u64,
    files_updated: u64,
    files_removed: u64,
}

impl DailyCounters {
    fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            files_processed: 0,
            files_added: 0,
            files_updated: 0,
            files_removed: 0,
        }
    }

    /// Resets the counters if the UTC date has rolled over since they were
    /// last touched.
    fn roll_if_needed(&mut self, today: NaiveDate) {
        if self.date != today {
            *self = Self::for_date(today);
        }
    }
}

/// Shared state read by the health/stats HTTP endpoints and written to by
/// every other component. Cheap to update: atomics and a couple of short
/// mutex critical sections, per SPEC_FULL.md section 5's "recent-enough"
/// visibility requirement.
#[derive(Debug)]
pub struct HealthState {
    started_at: Instant,
    database_connected: AtomicBool,
    watcher_active: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    daily: Mutex<DailyCounters>,
    processing_times_ms: Mutex<VecDeque<u64>>,
    pending_events: AtomicU64,
    processed_events: AtomicU64,
    failed_events: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            database_connected: AtomicBool::new(false),
            watcher_active: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            daily: Mutex::new(DailyCounters::for_date(Utc::now().date_naive())),
            processing_times_ms: Mutex::new(VecDeque::with_capacity(PROCESSING_TIME_WINDOW)),
            pending_events: AtomicU64::new(0),
            processed_events: AtomicU64::new(0),
            failed_events: AtomicU64::new(0),
        }
    }

    pub fn set_database_connected(&self, connected: bool) {
        self.database_connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_watcher_active(&self, active: bool) {
        self.watcher_active.store(active, Ordering::Relaxed);
    }

    pub fn set_pending_events(&self, pending: u64) {
        self.pending_events.store(pending, Ordering::Relaxed);
    }

    /// Records the outcome of one full sync (startup, periodic, or manual).
    pub fn record_full_sync(&self, stats: &SyncStats, at: DateTime<Utc>) {
        *self.last_sync.lock().unwrap() = Some(at);
        let mut daily = self.daily.lock().unwrap();
        daily.roll_if_needed(at.date_naive());
        daily.files_processed += stats.scanned;
        daily.files_added += stats.added;
        daily.files_updated += stats.updated;
        daily.files_removed += stats.removed;
    }

    /// Records the outcome of one dispatched event batch, including its
    /// wall-clock processing time for the rolling average.
    pub fn record_batch(&self, outcome: &EventBatchOutcome, processing_time_ms: u64, now: DateTime<Utc>) {
        let mut daily = self.daily.lock().unwrap();
        daily.roll_if_needed(now.date_naive());
        daily.files_processed += outcome.processed;
        daily.files_added += outcome.added;
        daily.files_updated += outcome.updated;
        daily.files_removed += outcome.removed;
        drop(daily);

        self.processed_events
            .fetch_add(outcome.processed, Ordering::Relaxed);
        self.failed_events
            .fetch_add(outcome.errors, Ordering::Relaxed);

        let mut window = self.processing_times_ms.lock().unwrap();
        if window.len() == PROCESSING_TIME_WINDOW {
            window.pop_front();
        }
        window.push_back(processing_time_ms);
    }

    /// Records a batch that failed every retry attempt and was dropped.
    pub fn record_dropped_batch(&self, failed_event_count: u64) {
        self.failed_events
            .fetch_add(failed_event_count, Ordering::Relaxed);
    }

    pub fn health(&self) -> HealthResponse {
        let database_connected = self.database_connected.load(Ordering::Relaxed);
        let watcher_active = self.watcher_active.load(Ordering::Relaxed);
        HealthResponse {
            status: if database_connected && watcher_active {
                "healthy"
            } else {
                "unhealthy"
            },
            uptime_seconds: self.started_at.elapsed().as_secs(),
            database_connected,
            watcher_active,
            last_sync: *self.last_sync.lock().unwrap(),
        }
    }

    pub fn stats(&self) -> StatsResponse {
        let now = Utc::now();
        let mut daily = self.daily.lock().unwrap();
        daily.roll_if_needed(now.date_naive());
        let (processed, added, updated, removed) = (
            daily.files_processed,
            daily.files_added,
            daily.files_updated,
            daily.files_removed,
        );
        drop(daily);

        let window = self.processing_times_ms.lock().unwrap();
        let average_processing_time_ms = if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<u64>() as f64 / window.len() as f64
        };
        drop(window);

        StatsResponse {
            sync_statistics: SyncStatistics {
                files_processed_today: processed,
                files_added_today: added,
                files_updated_today: updated,
                files_removed_today: removed,
                last_full_sync: *self.last_sync.lock().unwrap(),
                average_processing_time_ms,
            },
            event_queue: EventQueueStats {
                pending_events: self.pending_events.load(Ordering::Relaxed),
                processed_events: self.processed_events.load(Ordering::Relaxed),
                failed_events: self.failed_events.load(Ordering::Relaxed),
            },
            uptime: self.started_at.elapsed().as_secs(),
        }
    }
}
