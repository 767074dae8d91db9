use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchMetrics {
    pub recorded_at: DateTime<Utc>,
    pub camera_id: String,
    pub t_ms: i64,
    pub tracks_in: usize,
    pub annotated: usize,
    pub rejected: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub process_us: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub recent_batches: Vec<BatchMetrics>,
    pub batch_count: u64,
    pub tracks_in: u64,
    pub tracks_annotated: u64,
    pub tracks_rejected: u64,
    pub missing_embedding: u64,
    pub rejected_dimension: u64,
    pub rejected_degenerate: u64,
    pub fast_path: u64,
    pub matched: u64,
    pub allocated: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub rejected_batches: u64,
    pub persist_failures: u64,
}
