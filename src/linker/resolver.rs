use std::collections::HashMap;

use crate::models::{GlobalId, LocalTrackId};

use super::embedding::Embedding;
use super::gallery::{Gallery, GalleryEntry};

// Set to true to log every identity decision
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Cross-camera matching thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Minimum cosine similarity for a match; equality matches.
    pub sim_threshold: f64,
    /// Maximum age of a gallery entry eligible for matching.
    pub merge_window_ms: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            sim_threshold: 0.48,
            merge_window_ms: 15_000,
        }
    }
}

/// How an identity was obtained for a sighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The local track was already bound.
    Bound,
    /// Matched an entry from another camera.
    Matched { similarity: f64 },
    /// No candidate cleared the threshold; a fresh identity was issued.
    Allocated,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub global_id: GlobalId,
    pub resolution: Resolution,
}

/// Owns the gallery and the per-camera local track bindings.
#[derive(Debug)]
pub struct IdentityResolver {
    policy: MatchPolicy,
    gallery: Gallery,
    bindings: HashMap<String, HashMap<LocalTrackId, GlobalId>>,
    next_id: u64,
}

impl IdentityResolver {
    pub fn new(policy: MatchPolicy, gallery_capacity: usize) -> Self {
        Self {
            policy,
            gallery: Gallery::new(gallery_capacity),
            bindings: HashMap::new(),
            next_id: 1,
        }
    }

    /// Make sure identities issued from now on are above `issued`.
    pub fn resume_after(&mut self, issued: GlobalId) {
        self.next_id = self.next_id.max(issued.as_u64().saturating_add(1));
    }

    /// Resolve a sighting to a global identity.
    pub fn assign(
        &mut self,
        camera_id: &str,
        local_track_id: LocalTrackId,
        embedding: Embedding,
        t_ms: i64,
    ) -> GlobalId {
        self.resolve(camera_id, local_track_id, embedding, t_ms)
            .global_id
    }

    /// Like [`assign`](Self::assign), also reporting which path was taken.
    pub fn resolve(
        &mut self,
        camera_id: &str,
        local_track_id: LocalTrackId,
        embedding: Embedding,
        t_ms: i64,
    ) -> Assignment {
        if let Some(global_id) = self.binding(camera_id, local_track_id) {
            self.remember(global_id, camera_id, embedding, t_ms);
            return Assignment {
                global_id,
                resolution: Resolution::Bound,
            };
        }

        let assignment = match self.best_candidate(camera_id, &embedding, t_ms) {
            Some((global_id, similarity)) if similarity >= self.policy.sim_threshold => {
                log_info!(
                    "{camera_id}/T{local_track_id} linked to {global_id} (similarity {similarity:.3})"
                );
                Assignment {
                    global_id,
                    resolution: Resolution::Matched { similarity },
                }
            }
            _ => {
                let global_id = GlobalId(self.next_id);
                self.next_id += 1;
                log_info!("{camera_id}/T{local_track_id} allocated new identity {global_id}");
                Assignment {
                    global_id,
                    resolution: Resolution::Allocated,
                }
            }
        };

        self.bindings
            .entry(camera_id.to_string())
            .or_default()
            .insert(local_track_id, assignment.global_id);
        self.remember(assignment.global_id, camera_id, embedding, t_ms);
        assignment
    }

    pub fn binding(&self, camera_id: &str, local_track_id: LocalTrackId) -> Option<GlobalId> {
        self.bindings
            .get(camera_id)
            .and_then(|tracks| tracks.get(&local_track_id))
            .copied()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Identity the next allocation would receive.
    pub fn next_global_id(&self) -> GlobalId {
        GlobalId(self.next_id)
    }

    /// Most similar in-window entry from another camera. Ties keep the
    /// newest, which the scan visits first.
    fn best_candidate(
        &self,
        camera_id: &str,
        embedding: &Embedding,
        t_ms: i64,
    ) -> Option<(GlobalId, f64)> {
        let cutoff = t_ms.saturating_sub(self.policy.merge_window_ms);
        let mut best: Option<(GlobalId, f64)> = None;
        for candidate in self.gallery.scan_since(cutoff, camera_id) {
            let similarity = embedding.cosine(&candidate.embedding);
            match best {
                Some((_, best_sim)) if similarity <= best_sim => {}
                _ => best = Some((candidate.global_id, similarity)),
            }
        }
        best
    }

    fn remember(&mut self, global_id: GlobalId, camera_id: &str, embedding: Embedding, t_ms: i64) {
        self.gallery.append(GalleryEntry {
            global_id,
            camera_id: camera_id.to_string(),
            embedding,
            t_ms,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::embedding::normalize;
    use crate::linker::gallery::DEFAULT_GALLERY_CAPACITY;

    fn emb(raw: &[f64]) -> Embedding {
        normalize(raw, None).unwrap()
    }

    /// Unit vector whose cosine with `[1, 0]` is `sim`.
    fn at_similarity(sim: f64) -> Embedding {
        emb(&[sim, (1.0 - sim * sim).sqrt()])
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(MatchPolicy::default(), DEFAULT_GALLERY_CAPACITY)
    }

    #[test]
    fn similar_sighting_on_other_camera_reuses_identity() {
        let mut r = resolver();
        assert_eq!(r.assign("cam1", 1, emb(&[1.0, 0.0]), 0), GlobalId(1));
        let assignment = r.resolve("cam2", 1, at_similarity(0.9), 5000);
        assert_eq!(assignment.global_id, GlobalId(1));
        match assignment.resolution {
            Resolution::Matched { similarity } => assert!((similarity - 0.9).abs() < 1e-9),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn dissimilar_sighting_allocates_new_identity() {
        let mut r = resolver();
        assert_eq!(r.assign("cam1", 1, emb(&[1.0, 0.0]), 0), GlobalId(1));
        let assignment = r.resolve("cam2", 1, at_similarity(0.3), 5000);
        assert_eq!(assignment.global_id, GlobalId(2));
        assert_eq!(assignment.resolution, Resolution::Allocated);
    }

    #[test]
    fn same_camera_entries_are_never_candidates() {
        let mut r = resolver();
        assert_eq!(r.assign("cam1", 1, emb(&[1.0, 0.0]), 0), GlobalId(1));
        assert_eq!(r.assign("cam1", 2, emb(&[1.0, 0.0]), 10), GlobalId(2));
    }

    #[test]
    fn bound_track_keeps_identity_despite_drift() {
        let mut r = resolver();
        let gid = r.assign("cam1", 7, emb(&[1.0, 0.0]), 0);
        r.assign("cam2", 3, emb(&[0.0, 1.0]), 10);
        for (i, raw) in [[0.0, 1.0], [-1.0, 0.0], [0.3, -0.7]].iter().enumerate() {
            let assignment = r.resolve("cam1", 7, emb(raw), 20 + i as i64);
            assert_eq!(assignment.global_id, gid);
            assert_eq!(assignment.resolution, Resolution::Bound);
        }
        assert_eq!(r.binding("cam1", 7), Some(gid));
    }

    #[test]
    fn fast_path_refreshes_gallery() {
        let mut r = resolver();
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 0);
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 20_000);
        assert_eq!(r.gallery().entry_count(), 2);
        // Only the refreshed entry is inside the window now.
        assert_eq!(r.assign("cam2", 1, emb(&[1.0, 0.0]), 30_000), GlobalId(1));
    }

    #[test]
    fn similarity_equal_to_threshold_matches() {
        let base = emb(&[1.0, 0.0]);
        let query = emb(&[0.6, 0.8]);
        let sim = base.cosine(&query);

        let policy = MatchPolicy {
            sim_threshold: sim,
            merge_window_ms: 15_000,
        };
        let mut r = IdentityResolver::new(policy, 16);
        r.assign("cam1", 1, base.clone(), 0);
        assert_eq!(r.assign("cam2", 1, query.clone(), 1), GlobalId(1));

        // One ULP above the similarity: the same pair no longer matches.
        let policy = MatchPolicy {
            sim_threshold: f64::from_bits(sim.to_bits() + 1),
            merge_window_ms: 15_000,
        };
        let mut r = IdentityResolver::new(policy, 16);
        r.assign("cam1", 1, base, 0);
        assert_eq!(r.assign("cam2", 1, query, 1), GlobalId(2));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut r = resolver();
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 0);
        assert_eq!(r.assign("cam2", 1, emb(&[1.0, 0.0]), 15_000), GlobalId(1));

        let mut r = resolver();
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 0);
        assert_eq!(r.assign("cam2", 1, emb(&[1.0, 0.0]), 15_001), GlobalId(2));
    }

    #[test]
    fn best_candidate_wins_and_ties_prefer_newest() {
        let mut r = resolver();
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 0);
        r.assign("cam2", 1, emb(&[0.0, 1.0]), 1);
        // Closer to cam2's entry than to cam1's.
        assert_eq!(r.assign("cam3", 1, emb(&[0.2, 1.0]), 2), GlobalId(2));

        let mut r = IdentityResolver::new(
            MatchPolicy {
                sim_threshold: -1.0,
                merge_window_ms: 15_000,
            },
            16,
        );
        assert_eq!(r.assign("cam1", 1, emb(&[1.0, 0.0]), 0), GlobalId(1));
        assert_eq!(r.assign("cam1", 2, emb(&[-1.0, 0.0]), 1), GlobalId(2));
        // Orthogonal to both entries: the newer one wins the tie.
        assert_eq!(r.assign("cam3", 1, emb(&[0.0, 1.0]), 2), GlobalId(2));
    }

    #[test]
    fn eviction_at_capacity_forgets_oldest_entry() {
        let capacity = DEFAULT_GALLERY_CAPACITY;
        let mut r = IdentityResolver::new(MatchPolicy::default(), capacity);
        assert_eq!(r.assign("cam1", 1, emb(&[1.0, 0.0]), 0), GlobalId(1));
        for t in 1..=capacity as i64 {
            assert_eq!(r.assign("cam3", 9, emb(&[0.0, 1.0]), t), GlobalId(2));
        }
        assert_eq!(r.gallery().entry_count(), capacity);
        assert_eq!(r.gallery().total_evicted(), 1);
        // Would have matched G1 had it not been evicted.
        assert_eq!(r.assign("cam2", 1, emb(&[1.0, 0.0]), 5001), GlobalId(3));

        let mut r = IdentityResolver::new(MatchPolicy::default(), capacity + 1);
        r.assign("cam1", 1, emb(&[1.0, 0.0]), 0);
        for t in 1..=capacity as i64 {
            r.assign("cam3", 9, emb(&[0.0, 1.0]), t);
        }
        assert_eq!(r.assign("cam2", 1, emb(&[1.0, 0.0]), 5001), GlobalId(1));
    }

    #[test]
    fn identical_input_yields_identical_identities() {
        let run = || {
            let mut r = resolver();
            let script: [(&str, i64, [f64; 3], i64); 6] = [
                ("cam1", 1, [1.0, 0.1, 0.0], 0),
                ("cam2", 4, [0.9, 0.2, 0.1], 300),
                ("cam1", 2, [0.0, 1.0, 0.0], 600),
                ("cam3", 1, [0.1, 0.9, 0.2], 900),
                ("cam2", 5, [0.0, 0.0, 1.0], 1200),
                ("cam1", 1, [0.0, 0.0, 1.0], 1500),
            ];
            script
                .iter()
                .map(|(cam, tid, raw, t)| r.assign(cam, *tid, emb(raw), *t))
                .collect::<Vec<_>>()
        };
        let first = run();
        assert_eq!(first, run());
        assert_eq!(
            first,
            vec![
                GlobalId(1),
                GlobalId(1),
                GlobalId(2),
                GlobalId(2),
                GlobalId(3),
                GlobalId(1)
            ]
        );
    }

    #[test]
    fn resume_after_skips_issued_identities() {
        let mut r = resolver();
        r.resume_after(GlobalId(41));
        assert_eq!(r.next_global_id(), GlobalId(42));
        assert_eq!(r.assign("cam1", 1, emb(&[1.0]), 0), GlobalId(42));
        r.resume_after(GlobalId(3));
        assert_eq!(r.next_global_id(), GlobalId(43));
    }

    mod props {
        use std::collections::HashMap;

        use proptest::prelude::*;

        use super::*;
        use crate::linker::embedding::normalize;

        fn sighting() -> impl Strategy<Value = (u8, i64, Vec<f64>, i64)> {
            (
                0u8..3,
                0i64..4,
                prop::collection::vec(-1.0f64..1.0, 3),
                0i64..500,
            )
        }

        proptest! {
            #[test]
            fn assignment_is_deterministic_and_bindings_are_stable(
                script in prop::collection::vec(sighting(), 1..60)
            ) {
                let run = || {
                    let mut r = IdentityResolver::new(MatchPolicy::default(), 16);
                    let mut bound: HashMap<(u8, i64), GlobalId> = HashMap::new();
                    let mut ids = Vec::new();
                    let mut t_ms = 0;
                    for (cam, track, raw, dt) in &script {
                        t_ms += dt;
                        let Ok(embedding) = normalize(raw, None) else { continue };
                        let id = r.assign(&format!("cam{cam}"), *track, embedding, t_ms);
                        if let Some(previous) = bound.insert((*cam, *track), id) {
                            assert_eq!(previous, id);
                        }
                        ids.push(id);
                    }
                    ids
                };
                prop_assert_eq!(run(), run());
            }
        }
    }
}
