//! Periodic cloud synchronization
//!
//! Drains not-yet-forwarded records from the store, reduces them, publishes
//! one training batch upstream, and marks the drained records processed.
//! Delivery is at-least-once: a failed publish aborts the cycle before any
//! flag is touched, so the whole batch is retried next period.

use crate::models::Reducer;
use crate::pipeline::types::{
    channel_matrix, rows_to_map, ReducedEntry, TrainingBatch, UNLABELED,
};
use crate::store::RecordStore;
use crate::transport::ConnectionManager;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

/// Cycle phase. The job is either waiting out the period or draining; a
/// single loop task guarantees the two never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    Draining,
}

pub struct Synchronizer {
    edge_id: String,
    period: Duration,
    window_size: usize,
    store: Arc<dyn RecordStore>,
    /// None when reduction is disabled or its model failed to load.
    reducer: Option<Arc<dyn Reducer>>,
    publisher: Arc<ConnectionManager>,
    state: SyncState,
    now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl Synchronizer {
    pub fn new(
        edge_id: String,
        period_minutes: u64,
        window_size: usize,
        store: Arc<dyn RecordStore>,
        reducer: Option<Arc<dyn Reducer>>,
        publisher: Arc<ConnectionManager>,
    ) -> Self {
        Self::with_now_fn(
            edge_id,
            period_minutes,
            window_size,
            store,
            reducer,
            publisher,
            Box::new(Utc::now),
        )
    }

    /// Constructor with an injected clock, for deterministic tests.
    pub fn with_now_fn(
        edge_id: String,
        period_minutes: u64,
        window_size: usize,
        store: Arc<dyn RecordStore>,
        reducer: Option<Arc<dyn Reducer>>,
        publisher: Arc<ConnectionManager>,
        now_fn: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            edge_id,
            period: Duration::from_secs(period_minutes * 60),
            window_size,
            store,
            reducer,
            publisher,
            state: SyncState::Idle,
            now_fn,
        }
    }

    /// Periodic loop: one cycle per period elapse until shutdown. An
    /// in-flight cycle always finishes; shutdown only cancels the wait.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "⏰ Synchronizer started (period: {} min)",
            self.period.as_secs() / 60
        );

        let mut timer = interval(self.period);
        timer.tick().await; // the first tick fires immediately; wait a full period instead

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_cycle().await;
                    debug_assert_eq!(self.state, SyncState::Idle);
                }
                _ = shutdown.changed() => {
                    log::info!("👋 Synchronizer shutting down");
                    break;
                }
            }
        }
    }

    /// One drain-reduce-publish-mark cycle.
    pub async fn run_cycle(&mut self) {
        self.state = SyncState::Draining;

        let now = (self.now_fn)();
        let since = now - chrono::Duration::seconds(self.period.as_secs() as i64);

        log::info!("🔍 Fetching unread data for training...");
        let fetched = match self.store.fetch_unprocessed(since).await {
            Ok(fetched) => fetched,
            Err(e) => {
                log::error!("❌ Failed to fetch unread records: {}", e);
                self.state = SyncState::Idle;
                return;
            }
        };

        if fetched.is_empty() {
            log::info!("📭 No unread data found, skipping training data publication");
            self.state = SyncState::Idle;
            return;
        }

        let reducer = match &self.reducer {
            Some(reducer) => reducer.clone(),
            None => {
                log::warn!("⚠️ Reduction unavailable, cannot assemble a training batch");
                self.state = SyncState::Idle;
                return;
            }
        };

        let first_date = fetched.iter().map(|r| r.record.date.as_str()).min();
        let last_date = fetched.iter().map(|r| r.record.date.as_str()).max();

        // Every fetched record joins the flag sweep. One malformed or
        // unreducible record is skipped from the batch, not allowed to pin
        // the drain: reprocessing identical data cannot succeed.
        let mut ids = Vec::with_capacity(fetched.len());
        let mut entries = Vec::new();

        for stored in &fetched {
            ids.push(stored.id);

            let data = match &stored.record.data {
                Some(data) => data,
                None => {
                    log::warn!("⚠️ Skipping record {}: missing window data", stored.id);
                    continue;
                }
            };

            let rows = match channel_matrix(data, self.window_size) {
                Ok(rows) => rows,
                Err(e) => {
                    log::warn!("⚠️ Skipping record {}: {}", stored.id, e);
                    continue;
                }
            };

            let reduced = match reducer.transform(&rows) {
                Ok(reduced) => reduced,
                Err(e) => {
                    log::warn!("⚠️ Skipping record {}: reduction failed: {}", stored.id, e);
                    continue;
                }
            };

            entries.push(ReducedEntry {
                rows: rows_to_map(&reduced),
                label: stored.record.label.unwrap_or(UNLABELED),
            });
        }

        if entries.is_empty() {
            // Nothing publishable; untouched flags age out of the fetch
            // horizon on their own.
            log::info!("📭 No reducible records in this cycle");
            self.state = SyncState::Idle;
            return;
        }

        let batch = TrainingBatch {
            edge_id: self.edge_id.clone(),
            data: entries,
        };
        let count = batch.data.len();

        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("❌ Failed to encode training batch: {}", e);
                self.state = SyncState::Idle;
                return;
            }
        };

        if let Err(e) = self.publisher.publish(payload).await {
            log::error!(
                "❌ Publish failed, cycle aborted; batch will be retried next period: {}",
                e
            );
            self.state = SyncState::Idle;
            return;
        }

        log::info!(
            "📤 Published {} records from {} to {}",
            count,
            first_date.unwrap_or("N/A"),
            last_date.unwrap_or("N/A")
        );

        if let Err(e) = self.store.mark_processed(&ids).await {
            log::error!(
                "❌ Failed to mark records processed; duplicates will be republished: {}",
                e
            );
        }

        self.state = SyncState::Idle;
    }
}
