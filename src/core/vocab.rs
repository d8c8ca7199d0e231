//! Vocabulary table and plain-text vocabulary loading.
//!
//! A vocabulary is an immutable, contiguous list of tokens: id `0` through
//! `len - 1`, each bound to a fixed byte string. [`VocabTable`] indexes the
//! tokens both ways: dense by id for decoding, hashed by content for the
//! merge engine's reverse lookups.
//!
//! # Text format
//!
//! Vocabularies and merge lists interchange as line-oriented text, one entry
//! per line:
//!
//! ```text
//! SGVsbG8= 256
//! V29ybGQ= 257
//! ```
//!
//! where the first field is the base64-encoded token bytes and the second is
//! the token id. Merge lists are id triples:
//!
//! ```text
//! 72 101 256
//! ```
//!
//! meaning "token 72 followed by token 101 merges into token 256", with the
//! line's position in the file giving the rule's rank (earlier = applied
//! first).

use base64::{engine::general_purpose::STANDARD, Engine};
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Errors from vocabulary construction, lookup, or loading.
#[derive(Error, Debug)]
pub enum VocabError {
    /// The (id, bytes) pairs do not form a contiguous, duplicate-free table.
    #[error("malformed vocabulary: {0}")]
    Malformed(String),
    /// A token id at or beyond the vocabulary size.
    #[error("token id {id} out of range (vocabulary size {size})")]
    OutOfRange { id: u32, size: u32 },
    #[error("invalid base64 token: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid line format: {0}")]
    Parse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable token id ↔ byte-string table.
///
/// Constructed once from plain data and never mutated, so it can be shared
/// freely across threads. Where distinct ids carry identical byte strings
/// (degenerate but legal), the reverse index keeps the lowest id.
#[derive(Debug, Clone)]
pub struct VocabTable {
    tokens: Vec<Vec<u8>>,
    index: FxHashMap<Vec<u8>, u32>,
}

impl VocabTable {
    /// Build a table from (id, bytes) pairs.
    ///
    /// The pairs may arrive in any order but must cover ids `0..n` exactly
    /// once each; anything else is [`VocabError::Malformed`].
    pub fn new(pairs: Vec<(u32, Vec<u8>)>) -> Result<Self, VocabError> {
        let size = pairs.len();
        let mut tokens: Vec<Option<Vec<u8>>> = vec![None; size];

        for (id, bytes) in pairs {
            let slot = tokens
                .get_mut(id as usize)
                .ok_or_else(|| VocabError::Malformed(format!(
                    "token id {id} out of bounds for {size} entries; ids must be contiguous from 0"
                )))?;
            if slot.is_some() {
                return Err(VocabError::Malformed(format!("duplicate token id {id}")));
            }
            *slot = Some(bytes);
        }

        // Every slot filled: ids were a permutation of 0..size.
        let tokens: Vec<Vec<u8>> = tokens
            .into_iter()
            .enumerate()
            .map(|(id, slot)| {
                slot.ok_or_else(|| VocabError::Malformed(format!("missing token id {id}")))
            })
            .collect::<Result<_, _>>()?;

        let mut index = FxHashMap::default();
        for (id, bytes) in tokens.iter().enumerate() {
            // Lowest id wins for duplicate byte strings.
            index.entry(bytes.clone()).or_insert(id as u32);
        }

        Ok(Self { tokens, index })
    }

    /// Number of tokens in the table.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if the table holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Byte string of a token id, or `OutOfRange`.
    pub fn token_bytes(&self, id: u32) -> Result<&[u8], VocabError> {
        self.tokens
            .get(id as usize)
            .map(Vec::as_slice)
            .ok_or(VocabError::OutOfRange {
                id,
                size: self.tokens.len() as u32,
            })
    }

    /// Byte string of a token id, `None` if out of range.
    pub fn get(&self, id: u32) -> Option<&[u8]> {
        self.tokens.get(id as usize).map(Vec::as_slice)
    }

    /// Id of the token whose byte string is exactly `bytes`, if one exists.
    ///
    /// Returns the lowest matching id when several tokens share the bytes.
    pub fn token_id(&self, bytes: &[u8]) -> Option<u32> {
        self.index.get(bytes).copied()
    }

    /// Iterate over (id, bytes) in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.tokens
            .iter()
            .enumerate()
            .map(|(id, b)| (id as u32, b.as_slice()))
    }
}

/// Load vocabulary pairs from text data.
///
/// Format: `base64_token id\n` per line. Blank lines are skipped.
pub fn load_vocab(data: &[u8]) -> Result<Vec<(u32, Vec<u8>)>, VocabError> {
    let mut pairs = Vec::new();

    for line in data.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }

        let space_pos = line
            .iter()
            .rposition(|&b| b == b' ')
            .ok_or_else(|| VocabError::Parse("missing space separator".to_string()))?;

        let token = STANDARD.decode(&line[..space_pos])?;

        let id_str = std::str::from_utf8(&line[space_pos + 1..])
            .map_err(|_| VocabError::Parse("invalid UTF-8 in token id".to_string()))?;
        let id: u32 = id_str
            .trim()
            .parse()
            .map_err(|_| VocabError::Parse(format!("invalid token id: {id_str}")))?;

        pairs.push((id, token));
    }

    Ok(pairs)
}

/// Load vocabulary pairs from a file path.
pub fn load_vocab_file(path: &str) -> Result<Vec<(u32, Vec<u8>)>, VocabError> {
    let data = std::fs::read(path)?;
    load_vocab(&data)
}

/// Load merge rules from text data.
///
/// Format: `left right result\n` per line, all decimal token ids. Rule rank
/// is the line's position: earlier lines merge first.
pub fn load_merges(data: &[u8]) -> Result<Vec<(u32, u32, u32)>, VocabError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| VocabError::Parse("merge list is not valid UTF-8".to_string()))?;

    let mut rules = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_ascii_whitespace().map(|f| {
            f.parse::<u32>()
                .map_err(|_| VocabError::Parse(format!("invalid token id in merge rule: {line}")))
        });
        let (left, right, result) = match (fields.next(), fields.next(), fields.next()) {
            (Some(l), Some(r), Some(m)) => (l?, r?, m?),
            _ => {
                return Err(VocabError::Parse(format!(
                    "merge rule needs three ids: {line}"
                )))
            }
        };
        if fields.next().is_some() {
            return Err(VocabError::Parse(format!(
                "trailing fields in merge rule: {line}"
            )));
        }

        rules.push((left, right, result));
    }

    Ok(rules)
}

/// Load merge rules from a file path.
pub fn load_merges_file(path: &str) -> Result<Vec<(u32, u32, u32)>, VocabError> {
    let data = std::fs::read(path)?;
    load_merges(&data)
}
