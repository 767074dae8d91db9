mod batches;
mod sessions;
mod tracks;

pub use batches::BatchWrite;
