//! In-process vector index over note embeddings.
//!
//! One logical writer (the pipeline orchestrator) and many concurrent
//! readers (the search service). An entry exists iff the note completed the
//! embed stage for the current model version and has not been deleted; the
//! index is rebuilt from embedding records at startup and after a model
//! upgrade.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use scribe_core::{Error, IndexSeed, Result};

/// Cosine similarity between two equal-length vectors. Zero-magnitude
/// vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

/// A scored nearest-neighbor match.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredNote {
    pub note_id: Uuid,
    pub score: f32,
}

struct Entry {
    owner_id: Uuid,
    vector: Vec<f32>,
    model_version: String,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct IndexState {
    /// Fixed by the first entry; queries and upserts must match it.
    dimension: Option<usize>,
    entries: HashMap<Uuid, Entry>,
}

/// Nearest-neighbor index mapping note identity to its embedding.
#[derive(Default)]
pub struct VectorIndex {
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_dimension(state: &IndexState, len: usize) -> Result<()> {
        match state.dimension {
            Some(expected) if expected != len => Err(Error::DimensionMismatch {
                expected,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    /// Insert or replace the entry for a note. Last writer wins across
    /// model versions; a dimension change requires [`VectorIndex::rebuild`].
    pub fn upsert(&self, seed: IndexSeed) -> Result<()> {
        let vector = seed.vector.as_slice().to_vec();
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::check_dimension(&state, vector.len())?;
        state.dimension.get_or_insert(vector.len());
        debug!(note_id = %seed.note_id, model = %seed.model_version, "Index upsert");
        state.entries.insert(
            seed.note_id,
            Entry {
                owner_id: seed.owner_id,
                vector,
                model_version: seed.model_version,
                updated_at: seed.updated_at,
            },
        );
        Ok(())
    }

    /// Remove a note's entry. Returns whether an entry existed.
    pub fn remove(&self, note_id: Uuid) -> bool {
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.entries.remove(&note_id).is_some()
    }

    /// Rank the owner's notes by cosine similarity to `query`, descending,
    /// ties broken by most recent update. The owner filter is applied during
    /// the scan: other owners' notes never compete for the `k` slots, and a
    /// short result is returned as-is rather than padded.
    pub fn query(
        &self,
        query: &[f32],
        k: usize,
        owner_id: Uuid,
        exclude: Option<Uuid>,
    ) -> Result<Vec<ScoredNote>> {
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self::check_dimension(&state, query.len())?;

        let mut scored: Vec<(f32, DateTime<Utc>, Uuid)> = state
            .entries
            .iter()
            .filter(|(id, entry)| entry.owner_id == owner_id && Some(**id) != exclude)
            .map(|(id, entry)| (cosine_similarity(query, &entry.vector), entry.updated_at, *id))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, _, note_id)| ScoredNote { note_id, score })
            .collect())
    }

    /// Replace the whole index with entries built from embedding records.
    /// Required at startup and whenever the model changes dimension or
    /// semantics. Returns the number of entries.
    pub fn rebuild(&self, seeds: Vec<IndexSeed>) -> Result<usize> {
        let mut fresh = IndexState::default();
        for seed in seeds {
            let vector = seed.vector.as_slice().to_vec();
            Self::check_dimension(&fresh, vector.len())?;
            fresh.dimension.get_or_insert(vector.len());
            fresh.entries.insert(
                seed.note_id,
                Entry {
                    owner_id: seed.owner_id,
                    vector,
                    model_version: seed.model_version,
                    updated_at: seed.updated_at,
                },
            );
        }

        let count = fresh.entries.len();
        let mut state = self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = fresh;
        info!(entries = count, "Vector index rebuilt");
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, note_id: Uuid) -> bool {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .contains_key(&note_id)
    }

    /// Model version stored for a note, if indexed.
    pub fn model_version_of(&self, note_id: Uuid) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entries
            .get(&note_id)
            .map(|entry| entry.model_version.clone())
    }

    pub fn dimension(&self) -> Option<usize> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use scribe_core::Vector;

    fn seed(
        note_id: Uuid,
        owner_id: Uuid,
        vector: Vec<f32>,
        updated_at: DateTime<Utc>,
    ) -> IndexSeed {
        IndexSeed {
            note_id,
            owner_id,
            vector: Vector::from(vector),
            model_version: "test-v1".to_string(),
            updated_at,
        }
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_query_ranks_by_similarity() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();

        index.upsert(seed(near, owner, vec![1.0, 0.0, 0.0], now)).unwrap();
        index.upsert(seed(far, owner, vec![0.0, 1.0, 0.0], now)).unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 10, owner, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].note_id, near);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_query_never_returns_other_owners_notes() {
        let index = VectorIndex::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();
        let bobs_note = Uuid::new_v4();

        index
            .upsert(seed(bobs_note, bob, vec![1.0, 0.0], now))
            .unwrap();

        // Perfect match, wrong owner: never surfaced, not even to fill k.
        let hits = index.query(&[1.0, 0.0], 10, alice, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_excludes_requested_note() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        index.upsert(seed(target, owner, vec![1.0, 0.0], now)).unwrap();
        index.upsert(seed(other, owner, vec![0.9, 0.1], now)).unwrap();

        let hits = index.query(&[1.0, 0.0], 10, owner, Some(target)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, other);
    }

    #[test]
    fn test_ties_break_by_most_recent_update() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let base = Utc::now();

        index
            .upsert(seed(older, owner, vec![1.0, 0.0], base - Duration::hours(1)))
            .unwrap();
        index.upsert(seed(newer, owner, vec![1.0, 0.0], base)).unwrap();

        let hits = index.query(&[1.0, 0.0], 2, owner, None).unwrap();
        assert_eq!(hits[0].note_id, newer);
        assert_eq!(hits[1].note_id, older);
    }

    #[test]
    fn test_dimension_mismatch_is_a_hard_error() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        index
            .upsert(seed(Uuid::new_v4(), owner, vec![1.0, 0.0, 0.0], Utc::now()))
            .unwrap();

        let err = index.query(&[1.0, 0.0], 5, owner, None).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let err = index
            .upsert(seed(Uuid::new_v4(), owner, vec![1.0], Utc::now()))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_upsert_replaces_entry_per_note() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        let note = Uuid::new_v4();
        let now = Utc::now();

        index.upsert(seed(note, owner, vec![1.0, 0.0], now)).unwrap();
        index.upsert(seed(note, owner, vec![0.0, 1.0], now)).unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.query(&[0.0, 1.0], 1, owner, None).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rebuild_resets_dimension() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        index
            .upsert(seed(Uuid::new_v4(), owner, vec![1.0, 0.0], Utc::now()))
            .unwrap();
        assert_eq!(index.dimension(), Some(2));

        // Model upgrade to three dimensions: a full rebuild is the only way in.
        let count = index
            .rebuild(vec![seed(Uuid::new_v4(), owner, vec![1.0, 0.0, 0.0], Utc::now())])
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(index.dimension(), Some(3));
    }

    #[test]
    fn test_remove() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        let note = Uuid::new_v4();
        index.upsert(seed(note, owner, vec![1.0], Utc::now())).unwrap();

        assert!(index.contains(note));
        assert!(index.remove(note));
        assert!(!index.remove(note));
        assert!(index.is_empty());
    }

    #[test]
    fn test_query_truncates_to_k() {
        let index = VectorIndex::new();
        let owner = Uuid::new_v4();
        for _ in 0..5 {
            index
                .upsert(seed(Uuid::new_v4(), owner, vec![1.0, 0.0], Utc::now()))
                .unwrap();
        }
        let hits = index.query(&[1.0, 0.0], 3, owner, None).unwrap();
        assert_eq!(hits.len(), 3);
    }
}
