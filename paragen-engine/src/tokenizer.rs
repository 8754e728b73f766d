//! Tokenizer adapter: wraps a fixed subword tokenizer and exposes the single
//! operation the rest of the engine needs from it — encoding a literal
//! string to a token-id sequence, with no special tokens added.
//!
//! Two backends are supported. Production code loads a pretrained
//! HuggingFace `tokenizer.json`. Tests and the CLI's demo subcommand build a
//! tokenizer in-memory from an explicit vocabulary, using a greedy
//! longest-match trie in the same style as the romaji conversion trie this
//! crate's engine was adapted from.

use std::collections::HashMap;
use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;

use crate::error::{EngineError, Result};

/// A node in the in-memory vocabulary trie.
#[derive(Debug, Default)]
struct VocabNode {
    token: Option<u32>,
    children: HashMap<char, VocabNode>,
}

impl VocabNode {
    fn insert(&mut self, text: &str, token: u32) {
        let mut node = self;
        for ch in text.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.token = Some(token);
    }

    /// Longest vocabulary entry matching a prefix of `input`. Returns
    /// `(matched_chars, token)` or `None` if no entry matches at all.
    fn search_longest(&self, input: &str) -> Option<(usize, u32)> {
        let mut node = self;
        let mut best: Option<(usize, u32)> = None;
        for (idx, ch) in input.chars().enumerate() {
            match node.children.get(&ch) {
                Some(child) => {
                    node = child;
                    if let Some(token) = node.token {
                        best = Some((idx + 1, token));
                    }
                }
                None => break,
            }
        }
        best
    }
}

/// A tokenizer built in-memory from an explicit `(text, token_id)` vocabulary.
///
/// `encode_literal` greedily matches the longest known vocabulary entry at
/// each position, exactly as [`crate::fsm` trie-based acceptors do over
/// token ids rather than characters.
#[derive(Debug)]
pub struct VocabTokenizer {
    root: VocabNode,
}

impl VocabTokenizer {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        let mut root = VocabNode::default();
        for (text, token) in entries {
            root.insert(text.as_ref(), token);
        }
        Self { root }
    }

    fn encode(&self, s: &str) -> Result<Vec<u32>> {
        let mut out = Vec::new();
        let mut rest = s;
        while !rest.is_empty() {
            match self.root.search_longest(rest) {
                Some((matched_chars, token)) => {
                    out.push(token);
                    let byte_len: usize =
                        rest.chars().take(matched_chars).map(char::len_utf8).sum();
                    rest = &rest[byte_len..];
                }
                None => {
                    return Err(EngineError::TokenizerLoad(
                        format!("no vocabulary entry matches {rest:?}").into(),
                    ));
                }
            }
        }
        Ok(out)
    }
}

enum Backend {
    Pretrained(HfTokenizer),
    InMemory(VocabTokenizer),
}

/// Wraps a fixed subword tokenizer. No runtime state beyond the loaded
/// vocabulary; deterministic for the lifetime of the loaded tokenizer.
pub struct TokenizerAdapter {
    backend: Backend,
}

impl TokenizerAdapter {
    /// Load a pretrained tokenizer from a HuggingFace `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = HfTokenizer::from_file(path.as_ref())
            .map_err(|e| EngineError::TokenizerLoad(e))?;
        Ok(Self {
            backend: Backend::Pretrained(tokenizer),
        })
    }

    /// Build a tokenizer in-memory from an explicit vocabulary. Intended for
    /// tests and the CLI's demo subcommand, where shipping a real
    /// `tokenizer.json` would be overkill.
    pub fn from_vocab<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: AsRef<str>,
    {
        Self {
            backend: Backend::InMemory(VocabTokenizer::new(entries)),
        }
    }

    /// Encode a literal string to its token-id sequence. No special tokens
    /// are added; called only at initialization (to build the literal
    /// tables and prefix-acceptor tries) and, for tests, on demand.
    pub fn encode_literal(&self, s: &str) -> Result<Vec<u32>> {
        match &self.backend {
            Backend::Pretrained(t) => {
                let encoding = t
                    .encode(s, false)
                    .map_err(|e| EngineError::TokenizerLoad(e))?;
                Ok(encoding.get_ids().to_vec())
            }
            Backend::InMemory(v) => v.encode(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_vocab() -> TokenizerAdapter {
        TokenizerAdapter::from_vocab([
            ("category", 1u32),
            ("\": \"", 2),
            ("\"", 3),
            (",", 4),
            (" ", 5),
            ("Mug", 6),
        ])
    }

    #[test]
    fn encode_literal_is_deterministic() {
        let tok = demo_vocab();
        let a = tok.encode_literal("category\": \"").unwrap();
        let b = tok.encode_literal("category\": \"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec![1, 2]);
    }

    #[test]
    fn encode_literal_greedy_longest_match() {
        let tok = demo_vocab();
        // "\": \"" should be matched whole rather than as three single entries.
        let ids = tok.encode_literal("\": \"").unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn encode_literal_unknown_text_errors() {
        let tok = demo_vocab();
        assert!(tok.encode_literal("unseen-text").is_err());
    }
}
