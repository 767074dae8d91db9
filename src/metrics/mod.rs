mod types;

pub use types::{BatchMetrics, MetricsSnapshot};

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::linker::BatchStats;

const MAX_RECENT_BATCHES: usize = 20;

/// Running counters for the linker, shared between intake tasks.
#[derive(Clone)]
pub struct LinkerMetrics {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl Default for LinkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkerMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot {
                recent_batches: Vec::with_capacity(MAX_RECENT_BATCHES),
                ..MetricsSnapshot::default()
            })),
        }
    }

    pub async fn record_batch(
        &self,
        camera_id: &str,
        t_ms: i64,
        stats: &BatchStats,
        elapsed: Duration,
    ) {
        let mut state = self.inner.lock().await;

        state.batch_count += 1;
        state.tracks_in += stats.tracks_in as u64;
        state.tracks_annotated += stats.annotated as u64;
        state.tracks_rejected += stats.rejected() as u64;
        state.missing_embedding += stats.missing_embedding as u64;
        state.rejected_dimension += stats.rejected_dimension as u64;
        state.rejected_degenerate += stats.rejected_degenerate as u64;
        state.fast_path += stats.fast_path as u64;
        state.matched += stats.matched as u64;
        state.allocated += stats.allocated as u64;
        state.sessions_opened += stats.sessions_opened as u64;
        state.sessions_closed += stats.sessions_closed as u64;

        state.recent_batches.push(BatchMetrics {
            recorded_at: Utc::now(),
            camera_id: camera_id.to_string(),
            t_ms,
            tracks_in: stats.tracks_in,
            annotated: stats.annotated,
            rejected: stats.rejected(),
            sessions_opened: stats.sessions_opened,
            sessions_closed: stats.sessions_closed,
            process_us: u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
        });

        if state.recent_batches.len() > MAX_RECENT_BATCHES {
            state.recent_batches.remove(0);
        }
    }

    /// A batch refused before processing: negative timestamp or clock
    /// regression.
    pub async fn record_rejected_batch(&self) {
        self.inner.lock().await.rejected_batches += 1;
    }

    pub async fn record_persist_failure(&self) {
        self.inner.lock().await.persist_failures += 1;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().await.clone()
    }
}
