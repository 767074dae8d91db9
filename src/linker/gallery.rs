//! Bounded recency buffer of resolved embeddings.
//!
//! Entries are appended in arrival order and the oldest is evicted once the
//! buffer is full, whether or not it is still inside the merge window.
//! [`Gallery::scan_since`] walks newest-first and stops at the first entry
//! older than the cutoff. This assumes arrival order roughly follows
//! timestamp order: an in-window entry appended before an out-of-window one
//! is never reached. That approximation keeps a scan bounded by the number
//! of recent entries rather than the whole buffer.

use std::collections::VecDeque;

use crate::models::GlobalId;

use super::embedding::Embedding;

pub const DEFAULT_GALLERY_CAPACITY: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub global_id: GlobalId,
    pub camera_id: String,
    pub embedding: Embedding,
    pub t_ms: i64,
}

#[derive(Debug)]
pub struct Gallery {
    entries: VecDeque<GalleryEntry>,
    capacity: usize,
    evicted: u64,
}

impl Gallery {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_GALLERY_CAPACITY)),
            capacity,
            evicted: 0,
        }
    }

    /// Append at the tail, returning the evicted head entry if over capacity.
    pub fn append(&mut self, entry: GalleryEntry) -> Option<GalleryEntry> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.evicted += 1;
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Entries with `t_ms >= cutoff_ms` from cameras other than
    /// `exclude_camera`, newest first. Iteration ends at the first entry
    /// older than `cutoff_ms`.
    pub fn scan_since<'a>(
        &'a self,
        cutoff_ms: i64,
        exclude_camera: &'a str,
    ) -> impl Iterator<Item = &'a GalleryEntry> + 'a {
        self.entries
            .iter()
            .rev()
            .take_while(move |entry| entry.t_ms >= cutoff_ms)
            .filter(move |entry| entry.camera_id != exclude_camera)
    }

    /// Entries currently held.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn total_evicted(&self) -> u64 {
        self.evicted
    }
}
