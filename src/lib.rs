//! Braidr - vocabulary-driven BPE tokenizer with byte fallback
//!
//! A tokenizer core built around one invariant: decoding the tokenization of
//! any input reproduces that input exactly, byte for byte, whether or not
//! the input is valid UTF-8.
//!
//! - Explicit merge-rule table: (left, right) -> merged token, rank-ordered
//! - Single-byte fallback tokens guarantee totality over arbitrary bytes
//! - Linked-list merge engine (avoids O(N²) on pathological inputs)
//! - FxHashMap for fast lookups
//! - Aho-Corasick for fast special token matching
//! - LRU cache for repeatedly tokenized inputs
//! - Rayon parallelism for batch operations
//! - UTF-8 safe streaming decoder for token-by-token output

pub mod core;

pub use core::{
    load_merges, load_merges_file, load_vocab, load_vocab_file, MergeError, MergeTable,
    StreamingDecoder, Tokenizer, TokenizerError, VocabError, VocabTable,
};
