use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{global_id_from_sql, global_id_to_sql, invalid_column, parse_datetime},
};
use crate::models::{GlobalId, OpenSession, PresenceSession, SessionEvent};

fn row_to_session(row: &Row) -> Result<PresenceSession, rusqlite::Error> {
    let global_id: i64 = row.get("global_id")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(PresenceSession {
        id: row.get("id")?,
        camera_id: row.get("cam_id")?,
        global_id: global_id_from_sql(global_id).map_err(invalid_column)?,
        t_enter_ms: row.get("t_enter_ms")?,
        t_exit_ms: row.get("t_exit_ms")?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(invalid_column)?,
    })
}

fn row_to_open_session(row: &Row) -> Result<OpenSession, rusqlite::Error> {
    let global_id: i64 = row.get("global_id")?;

    Ok(OpenSession {
        camera_id: row.get("cam_id")?,
        global_id: global_id_from_sql(global_id).map_err(invalid_column)?,
        t_enter_ms: row.get("t_enter_ms")?,
        last_seen_ms: row.get("last_seen_ms")?,
    })
}

/// Open a session unless the pair already has one. Returns whether a row was
/// written.
pub(crate) fn open_session_in(
    conn: &Connection,
    camera_id: &str,
    global_id: GlobalId,
    t_enter_ms: i64,
    updated_at: &str,
) -> Result<bool> {
    let written = conn.execute(
        "INSERT INTO sessions (cam_id, global_id, t_enter_ms, t_exit_ms, updated_at)
         SELECT ?1, ?2, ?3, NULL, ?4
         WHERE NOT EXISTS (
             SELECT 1 FROM sessions
             WHERE cam_id = ?1 AND global_id = ?2 AND t_exit_ms IS NULL
         )",
        params![camera_id, global_id_to_sql(global_id)?, t_enter_ms, updated_at],
    )?;
    Ok(written > 0)
}

/// Close the most recent open session of the pair. Returns whether a row was
/// updated.
pub(crate) fn close_session_in(
    conn: &Connection,
    camera_id: &str,
    global_id: GlobalId,
    t_exit_ms: i64,
    updated_at: &str,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE sessions
         SET t_exit_ms = ?3,
             updated_at = ?4
         WHERE id = (
             SELECT id FROM sessions
             WHERE cam_id = ?1 AND global_id = ?2 AND t_exit_ms IS NULL
             ORDER BY id DESC
             LIMIT 1
         )",
        params![camera_id, global_id_to_sql(global_id)?, t_exit_ms, updated_at],
    )?;
    Ok(updated > 0)
}

/// Apply events in order. Returns how many changed a row.
pub(crate) fn apply_session_events_in(conn: &Connection, events: &[SessionEvent]) -> Result<usize> {
    let updated_at = Utc::now().to_rfc3339();
    let mut changed = 0;
    for event in events {
        let applied = match event {
            SessionEvent::Opened {
                camera_id,
                global_id,
                t_enter_ms,
            } => open_session_in(conn, camera_id, *global_id, *t_enter_ms, &updated_at)?,
            SessionEvent::Closed {
                camera_id,
                global_id,
                t_exit_ms,
            } => close_session_in(conn, camera_id, *global_id, *t_exit_ms, &updated_at)?,
        };
        if applied {
            changed += 1;
        }
    }
    Ok(changed)
}

impl Database {
    pub async fn open_session(
        &self,
        camera_id: &str,
        global_id: GlobalId,
        t_enter_ms: i64,
    ) -> Result<bool> {
        let camera_id = camera_id.to_string();
        self.execute(move |conn| {
            let updated_at = Utc::now().to_rfc3339();
            open_session_in(conn, &camera_id, global_id, t_enter_ms, &updated_at)
        })
        .await
    }

    pub async fn close_session(
        &self,
        camera_id: &str,
        global_id: GlobalId,
        t_exit_ms: i64,
    ) -> Result<bool> {
        let camera_id = camera_id.to_string();
        self.execute(move |conn| {
            let updated_at = Utc::now().to_rfc3339();
            close_session_in(conn, &camera_id, global_id, t_exit_ms, &updated_at)
        })
        .await
    }

    pub async fn apply_session_events(&self, events: &[SessionEvent]) -> Result<usize> {
        let events = events.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let changed = apply_session_events_in(&tx, &events)?;
            tx.commit()?;
            Ok(changed)
        })
        .await
    }

    /// Open sessions with the newest sighting recorded since each opened.
    pub async fn get_open_sessions(&self) -> Result<Vec<OpenSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.cam_id, s.global_id, s.t_enter_ms,
                        COALESCE(
                            (SELECT MAX(t.t_ms) FROM tracks t
                             WHERE t.cam_id = s.cam_id
                               AND t.global_id = s.global_id
                               AND t.t_ms >= s.t_enter_ms),
                            s.t_enter_ms
                        ) AS last_seen_ms
                 FROM sessions s
                 WHERE s.t_exit_ms IS NULL
                 ORDER BY s.cam_id ASC, s.global_id ASC",
            )?;

            let sessions = stmt
                .query_map([], row_to_open_session)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(sessions)
        })
        .await
    }

    pub async fn get_sessions_for_camera(&self, camera_id: &str) -> Result<Vec<PresenceSession>> {
        let camera_id = camera_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, cam_id, global_id, t_enter_ms, t_exit_ms, updated_at
                 FROM sessions
                 WHERE cam_id = ?1
                 ORDER BY t_enter_ms ASC, id ASC",
            )?;

            let sessions = stmt
                .query_map(params![camera_id], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(sessions)
        })
        .await
    }

    pub async fn get_sessions_for_identity(
        &self,
        global_id: GlobalId,
    ) -> Result<Vec<PresenceSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, cam_id, global_id, t_enter_ms, t_exit_ms, updated_at
                 FROM sessions
                 WHERE global_id = ?1
                 ORDER BY t_enter_ms ASC, id ASC",
            )?;

            let sessions = stmt
                .query_map(params![global_id_to_sql(global_id)?], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(sessions)
        })
        .await
    }
}
