use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use crate::models::{GlobalId, OpenSession, SessionEvent};

pub const DEFAULT_SESSION_TIMEOUT_MS: i64 = 2000;

/// Identities visible in one message, keyed by camera.
pub type PresenceMap = BTreeMap<String, BTreeSet<GlobalId>>;

/// In-memory state of one open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub entered_ms: i64,
    pub last_seen_ms: i64,
}

/// Tracks which identities are present on which camera.
///
/// A `(camera, identity)` pair has an open session exactly when it has a
/// [`Presence`] here. Ordered maps keep the emitted event order stable.
#[derive(Debug)]
pub struct SessionTracker {
    timeout_ms: i64,
    present: BTreeMap<String, BTreeMap<GlobalId, Presence>>,
}

impl SessionTracker {
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            timeout_ms,
            present: BTreeMap::new(),
        }
    }

    /// Restore open sessions read back from storage. Pairs already tracked
    /// are left untouched.
    pub fn rehydrate<I>(&mut self, open: I) -> usize
    where
        I: IntoIterator<Item = OpenSession>,
    {
        let mut restored = 0;
        for session in open {
            let slot = self
                .present
                .entry(session.camera_id)
                .or_default()
                .entry(session.global_id);
            if let Entry::Vacant(vacant) = slot {
                vacant.insert(Presence {
                    entered_ms: session.t_enter_ms,
                    last_seen_ms: session.last_seen_ms.max(session.t_enter_ms),
                });
                restored += 1;
            }
        }
        restored
    }

    /// Apply one message worth of presence at `now_ms`.
    ///
    /// Stale pairs are closed first, then present pairs are opened or
    /// refreshed. A closed session ends at its last sighting, not at `now_ms`.
    pub fn update(&mut self, present: &PresenceMap, now_ms: i64) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        self.close_stale(present, now_ms, &mut events);

        for (camera_id, global_ids) in present {
            let camera = self.present.entry(camera_id.clone()).or_default();
            for global_id in global_ids {
                match camera.get_mut(global_id) {
                    Some(presence) => presence.last_seen_ms = now_ms,
                    None => {
                        camera.insert(
                            *global_id,
                            Presence {
                                entered_ms: now_ms,
                                last_seen_ms: now_ms,
                            },
                        );
                        events.push(SessionEvent::Opened {
                            camera_id: camera_id.clone(),
                            global_id: *global_id,
                            t_enter_ms: now_ms,
                        });
                    }
                }
            }
        }
        self.present.retain(|_, camera| !camera.is_empty());

        events
    }

    fn close_stale(&mut self, present: &PresenceMap, now_ms: i64, events: &mut Vec<SessionEvent>) {
        let timeout_ms = self.timeout_ms;
        for (camera_id, camera) in self.present.iter_mut() {
            let visible = present.get(camera_id);
            camera.retain(|global_id, presence| {
                let stale = now_ms.saturating_sub(presence.last_seen_ms) > timeout_ms
                    && !visible.is_some_and(|ids| ids.contains(global_id));
                if stale {
                    events.push(SessionEvent::Closed {
                        camera_id: camera_id.clone(),
                        global_id: *global_id,
                        t_exit_ms: presence.last_seen_ms,
                    });
                }
                !stale
            });
        }
        self.present.retain(|_, camera| !camera.is_empty());
    }

    pub fn is_open(&self, camera_id: &str, global_id: GlobalId) -> bool {
        self.presence(camera_id, global_id).is_some()
    }

    pub fn presence(&self, camera_id: &str, global_id: GlobalId) -> Option<Presence> {
        self.present
            .get(camera_id)
            .and_then(|camera| camera.get(&global_id))
            .copied()
    }

    pub fn last_seen(&self, camera_id: &str, global_id: GlobalId) -> Option<i64> {
        self.presence(camera_id, global_id)
            .map(|presence| presence.last_seen_ms)
    }

    pub fn open_count(&self) -> usize {
        self.present.values().map(BTreeMap::len).sum()
    }
}
