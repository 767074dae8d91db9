pub mod batch;
pub mod identity;
pub mod session;

pub use batch::{
    AnnotatedBatch, AnnotatedTrack, BBox, ParsedBatch, SightingBatch, TrackObservation, TrackRow,
};
pub use identity::{GlobalId, LocalTrackId};
pub use session::{OpenSession, PresenceSession, SessionEvent};
