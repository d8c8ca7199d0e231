//! Core tokenization engine for braidr.
//!
//! This module contains the BPE tokenizer implementation with:
//! - Byte-pair merging using a linked-list algorithm (O(N log N) vs O(N²) for vectors)
//! - Vocabulary construction and validation from plain (id, bytes) data
//! - Explicit rank-ordered merge-rule table
//! - UTF-8 safe streaming decoder for token-by-token output
//! - Main tokenizer interface with LRU caching and Rayon parallelism
//!
//! # Architecture
//!
//! The core is organized into four main components:
//!
//! - [`VocabTable`]: immutable token id ↔ byte-string table
//! - [`MergeTable`]: rank-ordered byte-pair merge rules
//! - [`Tokenizer`]: tokenize/decode API, LRU cache, Aho-Corasick special
//!   token matching, Rayon batch operations
//! - [`StreamingDecoder`]: UTF-8 safe incremental decoding
//!
//! Tokenization always operates on bytes. Text input is tokenized as its
//! UTF-8 byte representation, so text and raw bytes share one engine and the
//! round-trip guarantee (`decode_bytes(tokenize_bytes(b)) == b`) holds for
//! every input, including bytes that are not valid UTF-8.

mod bpe;
mod merges;
mod streaming;
mod tokenizer;
mod vocab;

pub use bpe::byte_pair_merge;
pub use merges::{MergeError, MergeTable};
pub use streaming::StreamingDecoder;
pub use tokenizer::{Tokenizer, TokenizerError};
pub use vocab::{load_merges, load_merges_file, load_vocab, load_vocab_file, VocabError, VocabTable};
