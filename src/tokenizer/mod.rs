//! Tokenizer capability and the concrete encoders shipped with papersum.
//!
//! Chunk boundaries live in token space, so the chunker only needs `encode`/`decode`. The BPE
//! tokenizer resolves a `tiktoken` encoding from the model name and falls back to
//! `cl100k_base`; the whitespace tokenizer is used when no BPE table can be built at all and
//! doubles as a deterministic tokenizer for tests.

use anyhow::Error as TokenizerError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Identifier of a single token.
pub type TokenId = u32;

/// Interface implemented by tokenizers used for chunking.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids without special tokens.
    fn encode(&self, text: &str) -> Vec<TokenId>;

    /// Decode token ids back into text.
    fn decode(&self, tokens: &[TokenId]) -> String;
}

/// Byte-pair tokenizer backed by `tiktoken-rs`.
pub struct BpeTokenizer {
    encoding_name: String,
    bpe: CoreBPE,
}

/// A window edge may split a multi-byte character across at most this many tokens.
const MAX_PARTIAL_TOKENS: usize = 3;

impl BpeTokenizer {
    /// Build a tokenizer for the given model or encoding name.
    pub fn for_model(model: &str) -> Result<Self, TokenizerError> {
        let normalized = model.trim();
        let target = if normalized.is_empty() {
            "cl100k_base"
        } else {
            normalized
        };
        let bpe = resolve_encoding(target)?;
        Ok(Self {
            encoding_name: target.to_string(),
            bpe,
        })
    }

    /// Model or encoding name the tokenizer was resolved from.
    pub fn encoding_name(&self) -> &str {
        &self.encoding_name
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe.encode_ordinary(text)
    }

    /// Token slices cut at arbitrary offsets can start or end inside a UTF-8 sequence; those
    /// dangling tokens are dropped rather than failing the whole window.
    fn decode(&self, tokens: &[TokenId]) -> String {
        if tokens.is_empty() {
            return String::new();
        }
        for trimmed in 0..=(2 * MAX_PARTIAL_TOKENS) {
            for front in 0..=trimmed.min(MAX_PARTIAL_TOKENS) {
                let back = trimmed - front;
                if back > MAX_PARTIAL_TOKENS || front + back >= tokens.len() {
                    continue;
                }
                let window = tokens[front..tokens.len() - back].to_vec();
                if let Ok(text) = self.bpe.decode(window) {
                    if trimmed > 0 {
                        tracing::trace!(front, back, "Dropped partial tokens while decoding");
                    }
                    return text;
                }
            }
        }
        tracing::warn!(
            tokens = tokens.len(),
            encoding = %self.encoding_name,
            "Token window could not be decoded"
        );
        String::new()
    }
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::debug!(model, "Falling back to 'cl100k_base' encoding for chunking");
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Distinct words a [`WhitespaceTokenizer`] keeps before starting a fresh vocabulary.
pub const DEFAULT_VOCABULARY_LIMIT: usize = 1 << 20;

/// Word-level tokenizer: every whitespace-separated word becomes one token.
///
/// Ids are interned on first sight, so decoding is exact up to whitespace normalization. When an
/// `encode` would push the vocabulary past its limit, the vocabulary is cleared first; ids handed
/// out before that point no longer decode. A single text is never split across vocabularies.
pub struct WhitespaceTokenizer {
    vocabulary: Mutex<Vocabulary>,
    limit: usize,
}

#[derive(Default)]
struct Vocabulary {
    ids: HashMap<String, TokenId>,
    words: Vec<String>,
}

impl Vocabulary {
    fn intern(&mut self, word: &str) -> TokenId {
        if let Some(id) = self.ids.get(word) {
            return *id;
        }
        let id = self.words.len() as TokenId;
        self.words.push(word.to_string());
        self.ids.insert(word.to_string(), id);
        id
    }
}

impl WhitespaceTokenizer {
    /// Create a tokenizer with an empty vocabulary and [`DEFAULT_VOCABULARY_LIMIT`].
    pub fn new() -> Self {
        Self::with_vocabulary_limit(DEFAULT_VOCABULARY_LIMIT)
    }

    /// Create a tokenizer that starts over once it has seen `limit` distinct words.
    pub fn with_vocabulary_limit(limit: usize) -> Self {
        Self {
            vocabulary: Mutex::default(),
            limit: limit.max(1),
        }
    }

    /// Number of distinct words currently interned.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .words
            .len()
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        let mut vocabulary = self
            .vocabulary
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let words: Vec<&str> = text.split_whitespace().collect();
        let unseen = words
            .iter()
            .filter(|word| !vocabulary.ids.contains_key(**word))
            .count();
        if !vocabulary.words.is_empty() && vocabulary.words.len() + unseen > self.limit {
            tracing::debug!(
                words = vocabulary.words.len(),
                limit = self.limit,
                "Whitespace vocabulary full; starting a fresh one"
            );
            *vocabulary = Vocabulary::default();
        }
        words.into_iter().map(|word| vocabulary.intern(word)).collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> String {
        let vocabulary = self
            .vocabulary
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tokens
            .iter()
            .filter_map(|id| vocabulary.words.get(*id as usize))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the tokenizer paired with a summarization model.
///
/// Prefers a BPE table and degrades to whitespace tokenization when none can be loaded, so a
/// missing encoding never blocks summarization.
pub fn tokenizer_for_model(model: &str) -> Arc<dyn Tokenizer> {
    match BpeTokenizer::for_model(model) {
        Ok(tokenizer) => Arc::new(tokenizer),
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "BPE tokenizer unavailable; falling back to whitespace tokenizer"
            );
            Arc::new(WhitespaceTokenizer::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokenizer_interns_repeated_words() {
        let tokenizer = WhitespaceTokenizer::new();
        let ids = tokenizer.encode("a b a  c\nb");
        assert_eq!(ids, vec![0, 1, 0, 2, 1]);
        assert_eq!(tokenizer.decode(&ids[1..4]), "b a c");
    }

    #[test]
    fn whitespace_vocabulary_is_bounded() {
        let tokenizer = WhitespaceTokenizer::with_vocabulary_limit(3);
        assert_eq!(tokenizer.encode("a b c"), vec![0, 1, 2]);
        assert_eq!(tokenizer.encode("c a"), vec![2, 0]);
        assert_eq!(tokenizer.vocabulary_len(), 3);

        let ids = tokenizer.encode("d e");
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(tokenizer.vocabulary_len(), 2);
        assert_eq!(tokenizer.decode(&ids), "d e");
    }

    #[test]
    fn oversized_text_keeps_one_vocabulary() {
        let tokenizer = WhitespaceTokenizer::with_vocabulary_limit(2);
        let ids = tokenizer.encode("one two three four");
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(tokenizer.decode(&ids), "one two three four");
    }

    #[test]
    fn whitespace_tokenizer_handles_blank_input() {
        let tokenizer = WhitespaceTokenizer::new();
        assert!(tokenizer.encode("   \n\t").is_empty());
        assert_eq!(tokenizer.decode(&[]), "");
    }

    #[test]
    fn bpe_tokenizer_round_trips_ascii() {
        let tokenizer = BpeTokenizer::for_model("cl100k_base").expect("tokenizer");
        let text = "The quick brown fox jumps over the lazy dog.";
        let ids = tokenizer.encode(text);
        assert!(!ids.is_empty());
        assert_eq!(tokenizer.decode(&ids), text);
    }

    #[test]
    fn bpe_tokenizer_tolerates_split_multibyte_sequences() {
        let tokenizer = BpeTokenizer::for_model("cl100k_base").expect("tokenizer");
        let ids = tokenizer.encode("日本語のテキスト");
        for end in 1..ids.len() {
            let decoded = tokenizer.decode(&ids[..end]);
            assert!(decoded.chars().all(|c| c != '\u{FFFD}'));
        }
    }

    #[test]
    fn unknown_models_fall_back_to_cl100k() {
        let tokenizer = BpeTokenizer::for_model("llama3.2").expect("fallback encoding");
        assert_eq!(tokenizer.encoding_name(), "llama3.2");
        assert!(!tokenizer.encode("hello world").is_empty());
    }
}
