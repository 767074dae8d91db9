use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::db::Database;
use crate::linker::{LinkError, LinkerState};
use crate::metrics::LinkerMetrics;
use crate::models::{AnnotatedBatch, SightingBatch};
use crate::settings::LinkerSettings;

// Set to true to log persistence and recovery activity
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Shared linking state plus its storage and counters. Cheap to clone; every
/// intake task holds one.
#[derive(Clone)]
pub struct LinkerPipeline {
    state: Arc<Mutex<LinkerState>>,
    db: Database,
    metrics: LinkerMetrics,
}

impl LinkerPipeline {
    pub fn new(settings: &LinkerSettings, db: Database, metrics: LinkerMetrics) -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkerState::new(settings))),
            db,
            metrics,
        }
    }

    /// Rebuild in-memory state from storage. Returns the number of open
    /// sessions restored.
    pub async fn restore(&self) -> Result<usize> {
        let open = self
            .db
            .get_open_sessions()
            .await
            .context("failed to load open sessions")?;
        let max_issued = self
            .db
            .max_global_id()
            .await
            .context("failed to load highest global id")?;

        let restored = self.state.lock().await.rehydrate(open, max_issued);
        if let Some(issued) = max_issued {
            log_info!("resuming identities after {issued}, {restored} open session(s) restored");
        }
        Ok(restored)
    }

    /// Link one batch and queue its writes.
    ///
    /// Writes are queued before the state lock is released, so storage sees
    /// batches in the order they were processed. A storage failure is logged
    /// and counted; the annotated batch is still returned.
    pub async fn handle_batch(&self, batch: SightingBatch) -> Result<AnnotatedBatch, LinkError> {
        let started = Instant::now();

        let mut state = self.state.lock().await;
        let processed = state.process(batch);
        let outcome = match processed {
            Ok(outcome) => outcome,
            Err(err) => {
                drop(state);
                self.metrics.record_rejected_batch().await;
                return Err(err);
            }
        };
        let pending = self
            .db
            .submit_batch_writes(outcome.track_rows, outcome.session_events);
        drop(state);
        let elapsed = started.elapsed();

        let annotated = outcome.annotated;
        match pending {
            Ok(pending) => match pending.wait().await {
                Ok(written) => log_debug!(
                    "{} t={}: {} track row(s), {} session change(s)",
                    annotated.camera_id,
                    annotated.t_ms,
                    written.tracks_inserted,
                    written.sessions_changed
                ),
                Err(err) => {
                    log_error!(
                        "failed to persist {} t={}: {err:?}",
                        annotated.camera_id,
                        annotated.t_ms
                    );
                    self.metrics.record_persist_failure().await;
                }
            },
            Err(err) => {
                log_error!("failed to queue writes for {}: {err:?}", annotated.camera_id);
                self.metrics.record_persist_failure().await;
            }
        }

        self.metrics
            .record_batch(&annotated.camera_id, annotated.t_ms, &outcome.stats, elapsed)
            .await;
        Ok(annotated)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn metrics(&self) -> &LinkerMetrics {
        &self.metrics
    }

    /// Run `f` against the current linker state.
    pub async fn inspect<R>(&self, f: impl FnOnce(&LinkerState) -> R) -> R {
        f(&*self.state.lock().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GlobalId, TrackObservation};

    fn batch(camera: &str, t_ms: i64, tracks: Vec<(i64, Vec<f64>)>) -> SightingBatch {
        SightingBatch {
            camera_id: camera.to_string(),
            t_ms,
            frame_id: 0,
            tracks: tracks
                .into_iter()
                .map(|(track_id, embedding)| TrackObservation {
                    track_id,
                    bbox: [0.0, 0.0, 1.0, 1.0],
                    embedding: Some(embedding),
                    conf: None,
                    extra: Default::default(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn processed_batches_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("pipeline.sqlite3")).unwrap();
        let pipeline = LinkerPipeline::new(&LinkerSettings::default(), db, LinkerMetrics::new());

        let out = pipeline
            .handle_batch(batch("cam1", 0, vec![(4, vec![1.0, 0.0])]))
            .await
            .unwrap();
        assert_eq!(out.global_ids(), vec![GlobalId(1)]);

        let tracks = pipeline
            .database()
            .get_tracks_for_identity(GlobalId(1))
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
        let sessions = pipeline.database().get_sessions_for_camera("cam1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_open());
    }

    #[tokio::test]
    async fn rejected_batches_are_counted_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("pipeline.sqlite3")).unwrap();
        let pipeline = LinkerPipeline::new(&LinkerSettings::default(), db, LinkerMetrics::new());

        pipeline
            .handle_batch(batch("cam1", 500, vec![(1, vec![1.0, 0.0])]))
            .await
            .unwrap();
        let err = pipeline
            .handle_batch(batch("cam1", 100, vec![(2, vec![0.0, 1.0])]))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::ClockRegression { .. }));

        let snapshot = pipeline.metrics().snapshot().await;
        assert_eq!(snapshot.batch_count, 1);
        assert_eq!(snapshot.rejected_batches, 1);
        assert_eq!(pipeline.database().max_global_id().await.unwrap(), Some(GlobalId(1)));
    }

    #[tokio::test]
    async fn storage_failure_keeps_the_identity_decision() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("pipeline.sqlite3")).unwrap();
        let pipeline = LinkerPipeline::new(&LinkerSettings::default(), db, LinkerMetrics::new());

        pipeline
            .database()
            .execute(|conn| {
                conn.execute_batch("DROP TABLE sessions")?;
                Ok(())
            })
            .await
            .unwrap();

        let first = pipeline
            .handle_batch(batch("cam1", 0, vec![(4, vec![1.0, 0.0])]))
            .await
            .unwrap();
        assert_eq!(first.global_ids(), vec![GlobalId(1)]);
        assert_eq!(pipeline.metrics().snapshot().await.persist_failures, 1);

        // The failed transaction rolled back its track row too.
        let stored = pipeline
            .database()
            .get_tracks_for_identity(GlobalId(1))
            .await
            .unwrap();
        assert!(stored.is_empty());

        // Refreshing a bound track writes no session event, so it persists.
        let second = pipeline
            .handle_batch(batch("cam1", 100, vec![(4, vec![0.0, 1.0])]))
            .await
            .unwrap();
        assert_eq!(second.global_ids(), vec![GlobalId(1)]);
        assert!(pipeline.inspect(|state| state.tracker().is_open("cam1", GlobalId(1))).await);

        let snapshot = pipeline.metrics().snapshot().await;
        assert_eq!(snapshot.persist_failures, 1);
        assert_eq!(snapshot.batch_count, 2);
    }
}
