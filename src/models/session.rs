//! Presence session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::GlobalId;

/// A persisted presence interval of one identity on one camera.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceSession {
    pub id: i64,
    pub camera_id: String,
    pub global_id: GlobalId,
    pub t_enter_ms: i64,
    pub t_exit_ms: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl PresenceSession {
    pub fn is_open(&self) -> bool {
        self.t_exit_ms.is_none()
    }
}

/// State transition emitted by the session tracker, in the order it must be
/// applied to storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionEvent {
    Opened {
        camera_id: String,
        global_id: GlobalId,
        t_enter_ms: i64,
    },
    Closed {
        camera_id: String,
        global_id: GlobalId,
        t_exit_ms: i64,
    },
}

impl SessionEvent {
    pub fn is_opened(&self) -> bool {
        matches!(self, SessionEvent::Opened { .. })
    }
}

/// An open session read back from storage, used to rebuild tracker state on
/// startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSession {
    pub camera_id: String,
    pub global_id: GlobalId,
    pub t_enter_ms: i64,
    pub last_seen_ms: i64,
}
