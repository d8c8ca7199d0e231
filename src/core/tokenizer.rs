//! Main tokenizer interface: tokenize, decode, batch operations.

use aho_corasick::AhoCorasick;
use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use thiserror::Error;

use super::bpe::byte_pair_merge;
use super::merges::{MergeError, MergeTable};
use super::vocab::{load_merges, load_vocab, VocabError, VocabTable};

/// Errors from tokenizer construction and decoding.
///
/// Everything here is a deterministic property of the input and the tables;
/// nothing is transient, nothing is retried. `InvalidUtf8` is the one kind a
/// caller is expected to recover from (by falling back to [`Tokenizer::decode_bytes`]
/// or [`Tokenizer::decode_lossy`]); the rest indicate broken data.
#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("vocabulary error: {0}")]
    Vocab(#[from] VocabError),
    #[error("merge table error: {0}")]
    Merges(#[from] MergeError),
    /// The vocabulary defines no single-byte tokens at all.
    #[error("vocabulary defines no single-byte tokens; cannot tokenize arbitrary bytes")]
    EmptyVocabulary,
    /// Some bytes have single-byte tokens, but not all 256.
    #[error("no single-byte token for byte 0x{byte:02X}; byte fallback is incomplete")]
    IncompleteByteFallback { byte: u8 },
    /// A special token id collides with a vocabulary id.
    #[error("special token id {id} collides with the vocabulary (size {vocab_size})")]
    SpecialTokenConflict { id: u32, vocab_size: u32 },
    /// A token id outside both the vocabulary and the special tokens.
    #[error("token id {id} at position {position} is out of range")]
    OutOfRange { id: u32, position: usize },
    /// Decoded bytes are valid token content but not valid text.
    #[error("decoded bytes are not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },
    #[error("Aho-Corasick build error: {0}")]
    AhoCorasick(#[from] aho_corasick::BuildError),
}

/// Default cache size for tokenized inputs
const DEFAULT_CACHE_SIZE: usize = 4096;

/// Vocabulary-driven BPE tokenizer with byte fallback.
///
/// Holds an immutable [`VocabTable`] and [`MergeTable`] and exposes pure
/// tokenize/decode transformations over them. Construction verifies that the
/// vocabulary covers all 256 single bytes, which makes [`tokenize_bytes`]
/// total: any byte sequence, valid UTF-8 or not, tokenizes without error and
/// decodes back to the identical bytes.
///
/// All operations are safe to call concurrently from multiple threads; the
/// only internal mutability is the LRU cache behind a `Mutex`, and a
/// contended cache merely skips caching.
///
/// [`tokenize_bytes`]: Tokenizer::tokenize_bytes
#[derive(Debug)]
pub struct Tokenizer {
    vocab: VocabTable,
    merges: MergeTable,
    // Single-byte token for each byte value; the fallback floor that makes
    // tokenization total.
    byte_tokens: [u32; 256],
    special_tokens: FxHashMap<String, u32>,
    special_tokens_decoder: FxHashMap<u32, String>,
    special_token_strings: Vec<String>,
    special_matcher: Option<AhoCorasick>,
    chunk_cache: Mutex<LruCache<u64, Vec<u32>>>,
    cache_size: usize,
}

impl Tokenizer {
    /// Create a tokenizer from constructed tables.
    ///
    /// # Arguments
    /// * `vocab` - token id ↔ byte-string table
    /// * `merges` - rank-ordered merge rules
    /// * `special_tokens` - marker strings with ids above the vocabulary
    pub fn new(
        vocab: VocabTable,
        merges: MergeTable,
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        Self::with_cache_size(vocab, merges, special_tokens, DEFAULT_CACHE_SIZE)
    }

    /// Create a tokenizer with a custom cache size.
    pub fn with_cache_size(
        vocab: VocabTable,
        merges: MergeTable,
        special_tokens: FxHashMap<String, u32>,
        cache_size: usize,
    ) -> Result<Self, TokenizerError> {
        let byte_tokens = Self::build_byte_tokens(&vocab)?;

        for &id in special_tokens.values() {
            if (id as usize) < vocab.len() {
                return Err(TokenizerError::SpecialTokenConflict {
                    id,
                    vocab_size: vocab.len() as u32,
                });
            }
        }

        let special_tokens_decoder: FxHashMap<u32, String> = special_tokens
            .iter()
            .map(|(k, v)| (*v, k.clone()))
            .collect();

        let special_token_strings: Vec<String> = special_tokens.keys().cloned().collect();
        let special_matcher = if special_token_strings.is_empty() {
            None
        } else {
            Some(AhoCorasick::new(&special_token_strings)?)
        };

        let cache_size_nz =
            NonZeroUsize::new(cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        let chunk_cache = Mutex::new(LruCache::new(cache_size_nz));

        Ok(Self {
            vocab,
            merges,
            byte_tokens,
            special_tokens,
            special_tokens_decoder,
            special_token_strings,
            special_matcher,
            chunk_cache,
            cache_size,
        })
    }

    /// Create a tokenizer from vocabulary and merge-list text data.
    pub fn from_data(
        vocab_data: &[u8],
        merges_data: &[u8],
        special_tokens: FxHashMap<String, u32>,
    ) -> Result<Self, TokenizerError> {
        let vocab = VocabTable::new(load_vocab(vocab_data)?)?;
        let merges = MergeTable::new(&load_merges(merges_data)?, &vocab)?;
        Self::new(vocab, merges, special_tokens)
    }

    /// Resolve the single-byte token for every byte value.
    fn build_byte_tokens(vocab: &VocabTable) -> Result<[u32; 256], TokenizerError> {
        let mut table = [0u32; 256];
        let mut missing = None;
        let mut found = 0usize;

        for b in 0u8..=255 {
            match vocab.token_id(&[b]) {
                Some(id) => {
                    table[b as usize] = id;
                    found += 1;
                }
                None => missing = missing.or(Some(b)),
            }
        }

        match missing {
            None => Ok(table),
            Some(_) if found == 0 => Err(TokenizerError::EmptyVocabulary),
            Some(byte) => Err(TokenizerError::IncompleteByteFallback { byte }),
        }
    }

    /// Compute a fast hash for a byte slice to use as an LRU cache key.
    #[inline]
    fn hash_slice(slice: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        slice.hash(&mut hasher);
        hasher.finish()
    }

    /// Tokenize a raw byte sequence.
    ///
    /// Total over arbitrary bytes: every byte has a fallback token, so no
    /// input can fail. Empty input yields an empty sequence. Pure function of
    /// the input and the tables.
    pub fn tokenize_bytes(&self, bytes: &[u8]) -> Vec<u32> {
        if bytes.is_empty() {
            return vec![];
        }

        // Fast path: the entire input is a known token.
        if let Some(id) = self.vocab.token_id(bytes) {
            return vec![id];
        }

        let hash = Self::hash_slice(bytes);
        if let Ok(mut cache) = self.chunk_cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                return cached.clone();
            }
        }

        let seed: Vec<u32> = bytes.iter().map(|&b| self.byte_tokens[b as usize]).collect();
        let result = byte_pair_merge(seed, &self.merges);

        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.put(hash, result.clone());
        }

        result
    }

    /// Tokenize text as its UTF-8 bytes.
    ///
    /// There is no separate text path: this is [`tokenize_bytes`] on the
    /// string's byte representation, which is what keeps the round-trip
    /// guarantee uniform across text and binary input.
    ///
    /// [`tokenize_bytes`]: Tokenizer::tokenize_bytes
    pub fn tokenize(&self, text: &str) -> Vec<u32> {
        self.tokenize_bytes(text.as_bytes())
    }

    /// Tokenize text, encoding special token markers directly.
    ///
    /// Occurrences of special token strings become their ids without going
    /// through the merge engine; the text between them tokenizes normally.
    pub fn tokenize_with_special(&self, text: &str) -> Vec<u32> {
        let Some(ref special_matcher) = self.special_matcher else {
            return self.tokenize(text);
        };

        let mut result = Vec::new();
        let mut last_end = 0;

        for m in special_matcher.find_iter(text.as_bytes()) {
            if m.start() > last_end {
                result.extend(self.tokenize(&text[last_end..m.start()]));
            }

            let token_str = &self.special_token_strings[m.pattern().as_usize()];
            if let Some(&id) = self.special_tokens.get(token_str) {
                result.push(id);
            }

            last_end = m.end();
        }

        if last_end < text.len() {
            result.extend(self.tokenize(&text[last_end..]));
        }

        result
    }

    /// Decode token ids back to the byte sequence they represent.
    ///
    /// Concatenates each token's bytes in order. Fails on the first id that
    /// is neither a vocabulary token nor a special token, naming the id and
    /// its position.
    pub fn decode_bytes(&self, tokens: &[u32]) -> Result<Vec<u8>, TokenizerError> {
        let mut result = Vec::with_capacity(tokens.len() * 4);

        for (position, &id) in tokens.iter().enumerate() {
            if let Some(bytes) = self.vocab.get(id) {
                result.extend_from_slice(bytes);
            } else if let Some(special) = self.special_tokens_decoder.get(&id) {
                result.extend_from_slice(special.as_bytes());
            } else {
                return Err(TokenizerError::OutOfRange { id, position });
            }
        }

        Ok(result)
    }

    /// Decode token ids to text.
    ///
    /// Fails with [`TokenizerError::InvalidUtf8`] when the decoded bytes are
    /// not valid text, distinct from [`TokenizerError::OutOfRange`] and the
    /// expected outcome when the sequence represents binary data. Callers
    /// that must not fail on such sequences use [`decode_bytes`] or
    /// [`decode_lossy`].
    ///
    /// [`decode_bytes`]: Tokenizer::decode_bytes
    /// [`decode_lossy`]: Tokenizer::decode_lossy
    pub fn decode(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        String::from_utf8(bytes).map_err(|e| TokenizerError::InvalidUtf8 {
            valid_up_to: e.utf8_error().valid_up_to(),
        })
    }

    /// Decode token ids to text, replacing invalid UTF-8 with U+FFFD.
    ///
    /// Still fails on an out-of-range id; lossiness applies only to the
    /// text reinterpretation.
    pub fn decode_lossy(&self, tokens: &[u32]) -> Result<String, TokenizerError> {
        let bytes = self.decode_bytes(tokens)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Render a token sequence for inspection.
    ///
    /// One entry per token: the id and its literal content with
    /// non-printable bytes escaped, e.g. `[72]"H" [300]"ello" [0x8B]`.
    /// Unknown ids render as `[id]<invalid>`. Diagnostic output only; the
    /// exact format is not a stability contract.
    pub fn debug_render(&self, tokens: &[u32]) -> String {
        tokens
            .iter()
            .map(|&id| {
                if let Some(bytes) = self.vocab.get(id) {
                    format!("[{id}]\"{}\"", bytes.escape_ascii())
                } else if let Some(special) = self.special_tokens_decoder.get(&id) {
                    format!("[{id}]{special}")
                } else {
                    format!("[{id}]<invalid>")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Batch tokenize multiple texts in parallel.
    pub fn tokenize_batch(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts.par_iter().map(|text| self.tokenize(text)).collect()
    }

    /// Batch tokenize multiple texts with special token handling.
    pub fn tokenize_batch_with_special(&self, texts: &[String]) -> Vec<Vec<u32>> {
        texts
            .par_iter()
            .map(|text| self.tokenize_with_special(text))
            .collect()
    }

    /// Batch decode multiple token lists in parallel.
    pub fn decode_batch(&self, token_lists: &[Vec<u32>]) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode(tokens))
            .collect()
    }

    /// Batch decode multiple token lists in parallel, replacing invalid UTF-8.
    pub fn decode_batch_lossy(
        &self,
        token_lists: &[Vec<u32>],
    ) -> Result<Vec<String>, TokenizerError> {
        token_lists
            .par_iter()
            .map(|tokens| self.decode_lossy(tokens))
            .collect()
    }

    /// Total number of token ids, including special tokens.
    ///
    /// This is max id + 1 over both tables, the full id range a model using
    /// this vocabulary can emit.
    pub fn vocab_size(&self) -> usize {
        let max_special = self
            .special_tokens
            .values()
            .max()
            .map(|&id| id as usize + 1)
            .unwrap_or(0);
        self.vocab.len().max(max_special)
    }

    /// Bytes of any decodable id: vocabulary token or special token.
    pub fn token_bytes(&self, id: u32) -> Option<&[u8]> {
        self.vocab
            .get(id)
            .or_else(|| self.special_tokens_decoder.get(&id).map(|s| s.as_bytes()))
    }

    /// The vocabulary table.
    pub fn vocab(&self) -> &VocabTable {
        &self.vocab
    }

    /// The merge-rule table.
    pub fn merges(&self) -> &MergeTable {
        &self.merges
    }

    /// The special tokens map (string -> id).
    pub fn special_tokens(&self) -> &FxHashMap<String, u32> {
        &self.special_tokens
    }

    /// The special tokens decoder map (id -> string).
    pub fn special_tokens_decoder(&self) -> &FxHashMap<u32, String> {
        &self.special_tokens_decoder
    }

    /// Clear the tokenization cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.chunk_cache.lock() {
            cache.clear();
        }
    }

    /// Number of cached tokenizations.
    pub fn cache_len(&self) -> usize {
        self.chunk_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        // Caches are not shared between clones.
        let cache_size_nz =
            NonZeroUsize::new(self.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        let chunk_cache = Mutex::new(LruCache::new(cache_size_nz));

        let special_matcher = if self.special_token_strings.is_empty() {
            None
        } else {
            // The strings already built a matcher once; rebuilding cannot fail.
            AhoCorasick::new(&self.special_token_strings).ok()
        };

        Self {
            vocab: self.vocab.clone(),
            merges: self.merges.clone(),
            byte_tokens: self.byte_tokens,
            special_tokens: self.special_tokens.clone(),
            special_tokens_decoder: self.special_tokens_decoder.clone(),
            special_token_strings: self.special_token_strings.clone(),
            special_matcher,
            chunk_cache,
            cache_size: self.cache_size,
        }
    }
}
