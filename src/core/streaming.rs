//! UTF-8 safe streaming decoder for token-by-token output.
//!
//! When decoding tokens one at a time, a token's bytes may end in the middle
//! of a multi-byte UTF-8 character. [`StreamingDecoder`] buffers bytes across
//! token boundaries and only emits complete, valid characters; an incomplete
//! trailing sequence waits in the buffer for the next token to finish it.

use super::tokenizer::Tokenizer;

/// Stateful decoder that assembles token bytes into complete UTF-8 output.
///
/// # Example
///
/// ```ignore
/// let mut decoder = StreamingDecoder::new(&tokenizer);
/// for token_id in token_stream {
///     if let Some(text) = decoder.add_token(token_id) {
///         print!("{}", text);
///     }
/// }
/// print!("{}", decoder.flush());
/// ```
pub struct StreamingDecoder<'a> {
    tokenizer: &'a Tokenizer,
    buffer: Vec<u8>,
}

impl<'a> StreamingDecoder<'a> {
    /// Create a streaming decoder for the given tokenizer.
    pub fn new(tokenizer: &'a Tokenizer) -> Self {
        Self {
            tokenizer,
            buffer: Vec::with_capacity(16),
        }
    }

    /// Add a token and return any newly completed characters.
    ///
    /// Returns `None` while the buffered bytes still end mid-character, or
    /// when the id is unknown (unknown ids are skipped).
    pub fn add_token(&mut self, token_id: u32) -> Option<String> {
        let bytes = self.tokenizer.token_bytes(token_id)?;
        self.buffer.extend_from_slice(bytes);
        self.take_complete()
    }

    /// Add multiple tokens at once and return any completed characters.
    ///
    /// Unknown ids are skipped.
    pub fn add_tokens(&mut self, token_ids: &[u32]) -> Option<String> {
        for &token_id in token_ids {
            if let Some(bytes) = self.tokenizer.token_bytes(token_id) {
                self.buffer.extend_from_slice(bytes);
            }
        }
        self.take_complete()
    }

    /// Flush any remaining buffered bytes.
    ///
    /// An incomplete or invalid trailing sequence is replaced with U+FFFD.
    pub fn flush(&mut self) -> String {
        if self.buffer.is_empty() {
            return String::new();
        }

        let result = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        result
    }

    /// Discard any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// True if bytes are buffered awaiting completion.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Number of buffered bytes.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Drain and return the longest valid UTF-8 prefix of the buffer.
    ///
    /// Bytes after the prefix stay buffered: either the start of a
    /// character still awaiting its continuation bytes, or invalid bytes
    /// that will surface as U+FFFD at [`flush`].
    ///
    /// [`flush`]: StreamingDecoder::flush
    fn take_complete(&mut self) -> Option<String> {
        let split = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            // valid_up_to is the longest valid prefix whether the error is
            // an incomplete tail or a hard invalid sequence.
            Err(e) => e.valid_up_to(),
        };

        if split == 0 {
            return None;
        }

        let complete: Vec<u8> = self.buffer.drain(..split).collect();
        debug_assert!(std::str::from_utf8(&complete).is_ok());
        String::from_utf8(complete).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merges::MergeTable;
    use crate::core::vocab::VocabTable;
    use rustc_hash::FxHashMap;

    fn make_test_tokenizer() -> Tokenizer {
        let mut pairs: Vec<(u32, Vec<u8>)> = (0u32..256).map(|b| (b, vec![b as u8])).collect();
        pairs.push((256, "Hello".as_bytes().to_vec()));
        pairs.push((257, "世界".as_bytes().to_vec()));

        let vocab = VocabTable::new(pairs).unwrap();
        let merges = MergeTable::new(&[], &vocab).unwrap();

        let mut special_tokens = FxHashMap::default();
        special_tokens.insert("<|think|>".to_string(), 1000);

        Tokenizer::new(vocab, merges, special_tokens).unwrap()
    }

    #[test]
    fn test_simple_ascii() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        assert_eq!(decoder.add_token(b'H' as u32), Some("H".to_string()));
        assert_eq!(decoder.add_token(b'i' as u32), Some("i".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_multi_byte_complete() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        assert_eq!(decoder.add_token(257), Some("世界".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_multi_byte_split_across_tokens() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        // "世" in UTF-8 is 0xE4 0xB8 0x96, fed one byte token at a time.
        assert_eq!(decoder.add_token(0xE4), None);
        assert_eq!(decoder.pending_bytes(), 1);

        assert_eq!(decoder.add_token(0xB8), None);
        assert_eq!(decoder.pending_bytes(), 2);

        assert_eq!(decoder.add_token(0x96), Some("世".to_string()));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_special_token_emits_directly() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        assert_eq!(decoder.add_token(1000), Some("<|think|>".to_string()));
    }

    #[test]
    fn test_flush_incomplete() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        decoder.add_token(0xE4);
        decoder.add_token(0xB8);

        let flushed = decoder.flush();
        assert!(flushed.contains('\u{FFFD}'));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_invalid_byte_held_until_flush() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        // 0x8B is a bare continuation byte: never valid, never completable.
        assert_eq!(decoder.add_token(b'a' as u32), Some("a".to_string()));
        assert_eq!(decoder.add_token(0x8B), None);
        assert_eq!(decoder.add_token(b'b' as u32), None);

        let flushed = decoder.flush();
        assert_eq!(flushed, "\u{FFFD}b");
    }

    #[test]
    fn test_reset() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        decoder.add_token(0xE4);
        assert!(decoder.has_pending());

        decoder.reset();
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_unknown_id_skipped() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        assert_eq!(decoder.add_token(99999), None);
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_add_tokens_batch() {
        let tokenizer = make_test_tokenizer();
        let mut decoder = StreamingDecoder::new(&tokenizer);

        let result = decoder.add_tokens(&[b'H' as u32, b'i' as u32, b'!' as u32]);
        assert_eq!(result, Some("Hi!".to_string()));
    }
}
