//! Fixed-size token windows with overlap.
//!
//! Tokens are whitespace-delimited words. Consecutive windows share
//! `chunk_overlap` tokens. A trailing remainder no longer than the overlap is
//! folded into the last window instead of producing a sliver chunk made
//! mostly of repeated tokens, so a window may hold up to
//! `chunk_size + chunk_overlap` tokens.

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Window settings. `chunk_size` is the stride target, not a hard cap: the
/// last window of a document can carry up to `chunk_size + chunk_overlap`
/// tokens, which is the bound to size embedding model inputs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TokenChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DomainError> {
        if chunk_size == 0 {
            return Err(DomainError::configuration("chunk_size must be positive"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DomainError::configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, DomainError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + self.chunk_size).min(tokens.len());
            if tokens.len() - end <= self.chunk_overlap {
                end = tokens.len();
            }

            chunks.push(tokens[start..end].join(" "));

            if end == tokens.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

impl Default for TokenChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        assert!(matches!(
            TokenChunker::new(10, 10),
            Err(DomainError::Configuration(_))
        ));
        assert!(matches!(
            TokenChunker::new(0, 0),
            Err(DomainError::Configuration(_))
        ));
        assert!(TokenChunker::new(10, 0).is_ok());
    }

    #[test]
    fn test_empty_document_yields_no_chunks() {
        let chunker = TokenChunker::default();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("  \n\t ").is_empty());
    }

    #[test]
    fn test_short_document_is_one_chunk() {
        let chunker = TokenChunker::default();
        let chunks = chunker.split("Hello world.\n\nThis is a test.");
        assert_eq!(chunks, vec!["Hello world. This is a test.".to_string()]);
    }

    #[test]
    fn test_thousand_tokens_make_two_chunks() {
        let chunker = TokenChunker::default();
        let chunks = chunker.split(&words(1000));

        assert_eq!(chunks.len(), 2);
        let first: Vec<&str> = chunks[0].split(' ').collect();
        let second: Vec<&str> = chunks[1].split(' ').collect();
        assert_eq!(first.len(), 512);
        assert_eq!(first[0], "w0");
        assert_eq!(second[0], "w462");
        assert_eq!(*second.last().unwrap(), "w999");
    }

    #[test]
    fn test_chunks_reconstruct_token_stream() {
        let chunker = TokenChunker::new(20, 5).unwrap();
        for n in [1, 19, 20, 21, 26, 40, 97, 250] {
            let text = words(n);
            let chunks = chunker.split(&text);

            let mut rebuilt: Vec<String> = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                let tokens = chunk.split(' ').map(str::to_string);
                if i == 0 {
                    rebuilt.extend(tokens);
                } else {
                    rebuilt.extend(tokens.skip(5));
                }
            }

            let expected: Vec<String> = text.split(' ').map(str::to_string).collect();
            assert_eq!(rebuilt, expected, "n = {n}");

            let estimate = n.div_ceil(15);
            assert!(chunks.len() <= estimate && chunks.len() + 1 >= estimate, "n = {n}");
        }
    }

    #[test]
    fn test_folded_tail_stays_within_size_plus_overlap() {
        let chunker = TokenChunker::new(20, 5).unwrap();
        let chunks = chunker.split(&words(25));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].split(' ').count(), 25);

        for n in 1..120 {
            for chunk in chunker.split(&words(n)) {
                assert!(chunk.split(' ').count() <= 25, "n = {n}");
            }
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let chunker = TokenChunker::new(8, 3).unwrap();
        let text = words(57);
        assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}
