use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::models::{
    batch::DEFAULT_TRACK_CONF, AnnotatedBatch, AnnotatedTrack, GlobalId, OpenSession,
    SessionEvent, SightingBatch, TrackRow,
};
use crate::sessions::{PresenceMap, SessionTracker};
use crate::settings::LinkerSettings;

use super::embedding::{normalize, EmbeddingError};
use super::resolver::{IdentityResolver, Resolution};

// Set to true to log rejected tracks and batches
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("camera {camera_id} sent negative timestamp {t_ms}")]
    NegativeTimestamp { camera_id: String, t_ms: i64 },
    #[error("camera {camera_id} clock went backward from {last_ms} to {t_ms}")]
    ClockRegression {
        camera_id: String,
        last_ms: i64,
        t_ms: i64,
    },
}

/// Per-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub tracks_in: usize,
    pub annotated: usize,
    pub missing_embedding: usize,
    pub rejected_dimension: usize,
    pub rejected_degenerate: usize,
    pub fast_path: usize,
    pub matched: usize,
    pub allocated: usize,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

impl BatchStats {
    pub fn rejected(&self) -> usize {
        self.missing_embedding + self.rejected_dimension + self.rejected_degenerate
    }

    fn reject(&mut self, err: &EmbeddingError) {
        match err {
            EmbeddingError::DimensionMismatch { .. } => self.rejected_dimension += 1,
            EmbeddingError::Empty | EmbeddingError::Degenerate { .. } => {
                self.rejected_degenerate += 1
            }
        }
    }
}

/// Everything one batch produced, ready to forward and persist.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub annotated: AnnotatedBatch,
    pub track_rows: Vec<TrackRow>,
    pub session_events: Vec<SessionEvent>,
    pub stats: BatchStats,
}

/// All mutable linking state. Callers serialize access to it; a batch is
/// processed to completion before the next one starts.
#[derive(Debug)]
pub struct LinkerState {
    resolver: IdentityResolver,
    tracker: SessionTracker,
    embedding_dim: Option<usize>,
    camera_clock: HashMap<String, i64>,
}

impl LinkerState {
    pub fn new(settings: &LinkerSettings) -> Self {
        Self {
            resolver: IdentityResolver::new(settings.match_policy(), settings.gallery_capacity),
            tracker: SessionTracker::new(settings.session_timeout_ms),
            embedding_dim: settings.embedding_dim,
            camera_clock: HashMap::new(),
        }
    }

    /// Restore what survives a restart: open sessions and the identity
    /// counter.
    pub fn rehydrate(&mut self, open: Vec<OpenSession>, max_issued: Option<GlobalId>) -> usize {
        if let Some(issued) = max_issued {
            self.resolver.resume_after(issued);
        }
        self.tracker.rehydrate(open)
    }

    pub fn process(&mut self, batch: SightingBatch) -> Result<BatchOutcome, LinkError> {
        self.advance_clock(&batch.camera_id, batch.t_ms)?;

        let SightingBatch {
            camera_id,
            t_ms,
            frame_id,
            tracks,
        } = batch;

        let mut stats = BatchStats {
            tracks_in: tracks.len(),
            ..BatchStats::default()
        };
        let mut annotated = Vec::with_capacity(tracks.len());
        let mut track_rows = Vec::with_capacity(tracks.len());
        let mut visible = BTreeSet::new();

        for track in tracks {
            let Some(raw) = track.embedding.as_deref() else {
                stats.missing_embedding += 1;
                continue;
            };
            let embedding = match normalize(raw, self.embedding_dim) {
                Ok(embedding) => embedding,
                Err(err) => {
                    log_warn!(
                        "dropping {camera_id}/T{} at {t_ms} ({}): {err}",
                        track.track_id,
                        err.reason()
                    );
                    stats.reject(&err);
                    continue;
                }
            };
            self.embedding_dim.get_or_insert(embedding.dim());

            let assignment = self
                .resolver
                .resolve(&camera_id, track.track_id, embedding, t_ms);
            match assignment.resolution {
                Resolution::Bound => stats.fast_path += 1,
                Resolution::Matched { .. } => stats.matched += 1,
                Resolution::Allocated => stats.allocated += 1,
            }

            let global_id = assignment.global_id;
            visible.insert(global_id);
            track_rows.push(TrackRow {
                camera_id: camera_id.clone(),
                global_id,
                track_id: track.track_id,
                bbox: track.bbox,
                conf: track.conf.unwrap_or(DEFAULT_TRACK_CONF),
                t_ms,
            });
            annotated.push(AnnotatedTrack {
                track_id: track.track_id,
                bbox: track.bbox,
                global_id,
                conf: track.conf,
                extra: track.extra,
            });
        }
        stats.annotated = annotated.len();

        let mut presence = PresenceMap::new();
        presence.insert(camera_id.clone(), visible);
        let session_events = self.tracker.update(&presence, t_ms);
        for event in &session_events {
            if event.is_opened() {
                stats.sessions_opened += 1;
            } else {
                stats.sessions_closed += 1;
            }
        }

        Ok(BatchOutcome {
            annotated: AnnotatedBatch {
                camera_id,
                t_ms,
                frame_id,
                tracks: annotated,
            },
            track_rows,
            session_events,
            stats,
        })
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    fn advance_clock(&mut self, camera_id: &str, t_ms: i64) -> Result<(), LinkError> {
        if t_ms < 0 {
            let err = LinkError::NegativeTimestamp {
                camera_id: camera_id.to_string(),
                t_ms,
            };
            log_error!("rejecting batch: {err}");
            return Err(err);
        }
        match self.camera_clock.get_mut(camera_id) {
            Some(last_ms) if t_ms < *last_ms => {
                let err = LinkError::ClockRegression {
                    camera_id: camera_id.to_string(),
                    last_ms: *last_ms,
                    t_ms,
                };
                log_error!("rejecting batch: {err}");
                Err(err)
            }
            Some(last_ms) => {
                *last_ms = t_ms;
                Ok(())
            }
            None => {
                self.camera_clock.insert(camera_id.to_string(), t_ms);
                Ok(())
            }
        }
    }
}
