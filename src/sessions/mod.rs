pub mod tracker;

pub use tracker::{Presence, PresenceMap, SessionTracker, DEFAULT_SESSION_TIMEOUT_MS};
