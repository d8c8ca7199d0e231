//! Rank-ordered byte-pair merge rules.
//!
//! A merge rule says that two adjacent tokens combine into a single token.
//! Rules are ranked by their position in the input list: lower rank merges
//! first. The table maps `(left, right)` pairs to `(result, rank)` so the
//! engine can answer "may these neighbors merge, and how urgently?" in one
//! hash lookup.

use rustc_hash::FxHashMap;
use thiserror::Error;

use super::vocab::VocabTable;

/// Errors from merge-table construction.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A rule references a token id the vocabulary does not define.
    #[error("merge rule {rank} references undefined token id {id}")]
    UndefinedToken { rank: u32, id: u32 },
    /// A rule's result token is not the concatenation of its parts.
    ///
    /// Applying such a rule would change the bytes a token sequence decodes
    /// to, so it cannot coexist with exact round-trip decoding.
    #[error("merge rule {rank} is inconsistent: token {result} is not token {left} followed by token {right}")]
    Inconsistent {
        rank: u32,
        left: u32,
        right: u32,
        result: u32,
    },
}

/// Byte-pair merge rules, keyed by adjacent token pair.
///
/// Immutable after construction; shared freely across threads.
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    // (left, right) -> (result, rank); lower rank merges first.
    rules: FxHashMap<(u32, u32), (u32, u32)>,
}

impl MergeTable {
    /// Build a table from ordered `(left, right, result)` triples.
    ///
    /// Rank is the triple's position in the slice. Every referenced id must
    /// exist in `vocab`, and the result token's bytes must equal the left
    /// token's bytes followed by the right token's. When the same pair
    /// appears more than once, the first (lowest-rank) rule wins.
    pub fn new(rules: &[(u32, u32, u32)], vocab: &VocabTable) -> Result<Self, MergeError> {
        let mut table = FxHashMap::default();

        for (rank, &(left, right, result)) in rules.iter().enumerate() {
            let rank = rank as u32;

            let lookup = |id: u32| {
                vocab
                    .get(id)
                    .ok_or(MergeError::UndefinedToken { rank, id })
            };
            let left_bytes = lookup(left)?;
            let right_bytes = lookup(right)?;
            let result_bytes = lookup(result)?;

            let concatenates = result_bytes.len() == left_bytes.len() + right_bytes.len()
                && result_bytes[..left_bytes.len()] == *left_bytes
                && result_bytes[left_bytes.len()..] == *right_bytes;
            if !concatenates {
                return Err(MergeError::Inconsistent {
                    rank,
                    left,
                    right,
                    result,
                });
            }

            table.entry((left, right)).or_insert((result, rank));
        }

        Ok(Self { rules: table })
    }

    /// Merge priority of an adjacent pair, if a rule exists.
    ///
    /// Lower values merge first.
    pub fn rank_of(&self, left: u32, right: u32) -> Option<u32> {
        self.rules.get(&(left, right)).map(|&(_, rank)| rank)
    }

    /// Result token and rank of an adjacent pair, if a rule exists.
    pub fn merged(&self, left: u32, right: u32) -> Option<(u32, u32)> {
        self.rules.get(&(left, right)).copied()
    }

    /// Number of distinct mergeable pairs.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True if no rules are defined.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
