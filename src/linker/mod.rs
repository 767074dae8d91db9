pub mod embedding;
pub mod gallery;
pub mod resolver;
pub mod state;

pub use embedding::{normalize, Embedding, EmbeddingError};
pub use gallery::{Gallery, GalleryEntry, DEFAULT_GALLERY_CAPACITY};
pub use resolver::{Assignment, IdentityResolver, MatchPolicy, Resolution};
pub use state::{BatchOutcome, BatchStats, LinkError, LinkerState};
