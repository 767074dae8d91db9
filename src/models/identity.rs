use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier scoped to one camera's continuity tracker.
pub type LocalTrackId = i64;

/// Cross-camera identity of one physical person. Allocated monotonically,
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GlobalId(pub u64);

impl GlobalId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}
