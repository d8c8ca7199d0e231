//! Special token integration tests.
//!
//! Special tokens are out-of-vocabulary marker strings encoded directly to
//! their ids, bypassing the merge engine. They must segment correctly inside
//! surrounding text, decode back to their strings, and survive round-trips.

use braidr::{MergeTable, StreamingDecoder, Tokenizer, VocabTable};
use rustc_hash::FxHashMap;

const END: u32 = 300;
const SYSTEM: u32 = 301;
const USER: u32 = 302;

fn tokenizer_with_special() -> Tokenizer {
    let pairs: Vec<(u32, Vec<u8>)> = (0u32..256).map(|b| (b, vec![b as u8])).collect();
    let vocab = VocabTable::new(pairs).unwrap();
    let merges = MergeTable::new(&[], &vocab).unwrap();

    let mut special = FxHashMap::default();
    special.insert("<|endoftext|>".to_string(), END);
    special.insert("<|system|>".to_string(), SYSTEM);
    special.insert("<|user|>".to_string(), USER);

    Tokenizer::new(vocab, merges, special).unwrap()
}

#[test]
fn test_special_tokens_segment() {
    let tokenizer = tokenizer_with_special();

    let tokens = tokenizer.tokenize_with_special("hi<|endoftext|>there");
    assert!(tokens.contains(&END));

    // Text on both sides survives the split.
    let decoded = tokenizer.decode(&tokens).unwrap();
    assert_eq!(decoded, "hi<|endoftext|>there");
}

#[test]
fn test_plain_tokenize_ignores_markers() {
    let tokenizer = tokenizer_with_special();

    // Without the special path the marker is ordinary text and byte-tokenizes.
    let tokens = tokenizer.tokenize("<|endoftext|>");
    assert!(!tokens.contains(&END));
    assert_eq!(tokenizer.decode(&tokens).unwrap(), "<|endoftext|>");
}

#[test]
fn test_adjacent_and_boundary_markers() {
    let tokenizer = tokenizer_with_special();

    let text = "<|system|>rules<|user|>question<|endoftext|>";
    let tokens = tokenizer.tokenize_with_special(text);

    let specials: Vec<u32> = tokens
        .iter()
        .copied()
        .filter(|id| *id >= 256)
        .collect();
    assert_eq!(specials, vec![SYSTEM, USER, END]);

    assert_eq!(tokenizer.decode(&tokens).unwrap(), text);
}

#[test]
fn test_marker_only_input() {
    let tokenizer = tokenizer_with_special();

    let tokens = tokenizer.tokenize_with_special("<|endoftext|>");
    assert_eq!(tokens, vec![END]);
}

#[test]
fn test_special_decode_and_render() {
    let tokenizer = tokenizer_with_special();

    assert_eq!(tokenizer.decode(&[SYSTEM]).unwrap(), "<|system|>");
    assert!(tokenizer
        .debug_render(&[SYSTEM])
        .contains("<|system|>"));
}

#[test]
fn test_vocab_size_spans_special_ids() {
    let tokenizer = tokenizer_with_special();
    assert_eq!(tokenizer.vocab_size(), USER as usize + 1);
}

#[test]
fn test_batch_with_special_matches_individual() {
    let tokenizer = tokenizer_with_special();

    let texts = vec![
        "a<|endoftext|>b".to_string(),
        "<|system|>x".to_string(),
        "plain".to_string(),
    ];
    let batch = tokenizer.tokenize_batch_with_special(&texts);
    for (tokens, text) in batch.iter().zip(&texts) {
        assert_eq!(tokens, &tokenizer.tokenize_with_special(text));
    }
}

#[test]
fn test_streaming_decoder_handles_specials() {
    let tokenizer = tokenizer_with_special();

    let tokens = tokenizer.tokenize_with_special("ok<|endoftext|>");
    let mut decoder = StreamingDecoder::new(&tokenizer);

    let mut out = String::new();
    for id in tokens {
        if let Some(chunk) = decoder.add_token(id) {
            out.push_str(&chunk);
        }
    }
    out.push_str(&decoder.flush());

    assert_eq!(out, "ok<|endoftext|>");
}
