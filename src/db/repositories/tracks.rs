use anyhow::Result;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{global_id_from_sql, global_id_to_sql, invalid_column},
};
use crate::models::{GlobalId, TrackRow};

fn row_to_track(row: &Row) -> Result<TrackRow, rusqlite::Error> {
    let global_id: i64 = row.get("global_id")?;

    Ok(TrackRow {
        camera_id: row.get("cam_id")?,
        global_id: global_id_from_sql(global_id).map_err(invalid_column)?,
        track_id: row.get("track_id")?,
        bbox: [
            row.get("x1")?,
            row.get("y1")?,
            row.get("x2")?,
            row.get("y2")?,
        ],
        conf: row.get("conf")?,
        t_ms: row.get("t_ms")?,
    })
}

/// Insert rows, skipping sightings already stored. Returns the number of
/// new rows.
pub(crate) fn insert_track_rows_in(conn: &Connection, rows: &[TrackRow]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO tracks (cam_id, global_id, track_id, x1, y1, x2, y2, conf, t_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;

    let mut inserted = 0;
    for row in rows {
        let [x1, y1, x2, y2] = row.bbox;
        inserted += stmt.execute(params![
            row.camera_id,
            global_id_to_sql(row.global_id)?,
            row.track_id,
            x1,
            y1,
            x2,
            y2,
            row.conf,
            row.t_ms,
        ])?;
    }
    Ok(inserted)
}

impl Database {
    /// Batch insert track rows in one transaction.
    pub async fn insert_track_rows(&self, rows: &[TrackRow]) -> Result<usize> {
        let rows = rows.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let inserted = insert_track_rows_in(&tx, &rows)?;
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    /// Track rows of one identity across all cameras, oldest first.
    pub async fn get_tracks_for_identity(&self, global_id: GlobalId) -> Result<Vec<TrackRow>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT cam_id, global_id, track_id, x1, y1, x2, y2, conf, t_ms
                 FROM tracks
                 WHERE global_id = ?1
                 ORDER BY t_ms ASC, id ASC",
            )?;

            let tracks = stmt
                .query_map(params![global_id_to_sql(global_id)?], row_to_track)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(tracks)
        })
        .await
    }

    /// Highest identity ever written to either table.
    pub async fn max_global_id(&self) -> Result<Option<GlobalId>> {
        self.execute(|conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(global_id) FROM (
                    SELECT global_id FROM tracks
                    UNION ALL
                    SELECT global_id FROM sessions
                 )",
                [],
                |row| row.get(0),
            )?;
            max.map(global_id_from_sql).transpose()
        })
        .await
    }
}
