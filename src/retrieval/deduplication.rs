//! Candidate merging with text-keyed deduplication

use crate::retrieval::{Candidate, CandidateSet};

/// Merge newly retrieved candidates into the accumulated set
///
/// Accumulated candidates keep their place at the front; new candidates follow
/// in arrival order. A chunk text already present is dropped, whichever
/// position it was found at.
pub fn merge_candidates(
    accumulated: &CandidateSet,
    retrieved: impl IntoIterator<Item = Candidate>,
) -> CandidateSet {
    let mut merged = accumulated.clone();
    for candidate in retrieved {
        merged.insert(candidate.position, candidate.text);
    }
    merged
}
