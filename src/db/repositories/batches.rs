use anyhow::Result;

use crate::db::connection::{Database, Pending};
use crate::models::{SessionEvent, TrackRow};

use super::{sessions::apply_session_events_in, tracks::insert_track_rows_in};

/// Row counts written by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWrite {
    pub tracks_inserted: usize,
    pub sessions_changed: usize,
}

impl Database {
    /// Queue all writes of one processed batch as a single transaction.
    ///
    /// Track rows land before session events. The queue position is taken
    /// when this returns, so callers holding the linker lock get writes in
    /// processing order.
    pub fn submit_batch_writes(
        &self,
        rows: Vec<TrackRow>,
        events: Vec<SessionEvent>,
    ) -> Result<Pending<BatchWrite>> {
        self.submit(move |conn| {
            let tx = conn.transaction()?;
            let tracks_inserted = insert_track_rows_in(&tx, &rows)?;
            let sessions_changed = apply_session_events_in(&tx, &events)?;
            tx.commit()?;
            Ok(BatchWrite {
                tracks_inserted,
                sessions_changed,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlobalId;

    fn sighting(t_ms: i64) -> TrackRow {
        TrackRow {
            camera_id: "cam1".into(),
            global_id: GlobalId(1),
            track_id: 7,
            bbox: [0.0, 0.0, 5.0, 5.0],
            conf: 1.0,
            t_ms,
        }
    }

    #[tokio::test]
    async fn redelivered_batch_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("batches.sqlite3")).unwrap();
        let opened = vec![SessionEvent::Opened {
            camera_id: "cam1".into(),
            global_id: GlobalId(1),
            t_enter_ms: 0,
        }];

        let first = db
            .submit_batch_writes(vec![sighting(0)], opened.clone())
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(
            first,
            BatchWrite {
                tracks_inserted: 1,
                sessions_changed: 1,
            }
        );

        let second = db
            .submit_batch_writes(vec![sighting(0)], opened)
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(second, BatchWrite::default());
    }

    #[tokio::test]
    async fn queued_batches_commit_in_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("batches.sqlite3")).unwrap();

        let open = db
            .submit_batch_writes(
                vec![sighting(0)],
                vec![SessionEvent::Opened {
                    camera_id: "cam1".into(),
                    global_id: GlobalId(1),
                    t_enter_ms: 0,
                }],
            )
            .unwrap();
        let close = db
            .submit_batch_writes(
                vec![],
                vec![SessionEvent::Closed {
                    camera_id: "cam1".into(),
                    global_id: GlobalId(1),
                    t_exit_ms: 0,
                }],
            )
            .unwrap();
        close.wait().await.unwrap();
        open.wait().await.unwrap();

        let sessions = db.get_sessions_for_camera("cam1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].t_exit_ms, Some(0));
    }
}
