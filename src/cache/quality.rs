//! Quality scoring for cacheable responses.
//!
//! The score decides which copy survives when two answers land on the same
//! fingerprint, and breaks similarity ties on lookup. It never gates
//! routing: a low-quality response is still returned to the caller.

use crate::providers::truncation::ends_cleanly;
use crate::types::{ProviderResponse, Request};

/// Rates a successful response in `[0, 1]`.
pub trait QualityScorer: Send + Sync {
    fn score(&self, request: &Request, response: &ProviderResponse) -> f32;
}

/// Length/shape/keyword heuristic. Works without any model.
///
/// - empty (whitespace-only) text scores 0
/// - text shorter than `min_chars` or longer than `max_chars` is scaled down
/// - text not ending in terminal punctuation loses a little
/// - each configured refusal phrase found costs `phrase_penalty`
#[derive(Debug, Clone)]
pub struct HeuristicQualityScorer {
    min_chars: usize,
    max_chars: usize,
    refusal_phrases: Vec<String>,
    phrase_penalty: f32,
}

impl Default for HeuristicQualityScorer {
    fn default() -> Self {
        Self {
            min_chars: 12,
            max_chars: 2_000,
            refusal_phrases: vec![
                "i'm sorry, but".into(),
                "as an ai".into(),
                "i cannot help".into(),
                "i can't help".into(),
            ],
            phrase_penalty: 0.3,
        }
    }
}

impl HeuristicQualityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preferred length band, in characters.
    pub fn length_band(mut self, min_chars: usize, max_chars: usize) -> Self {
        self.min_chars = min_chars;
        self.max_chars = max_chars.max(min_chars);
        self
    }

    /// Replace the phrases that mark a low-value answer.
    pub fn refusal_phrases<I, S>(mut self, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refusal_phrases = phrases
            .into_iter()
            .map(|p| p.into().to_lowercase())
            .collect();
        self
    }
}

impl QualityScorer for HeuristicQualityScorer {
    fn score(&self, _request: &Request, response: &ProviderResponse) -> f32 {
        let text = response.text.trim();
        if text.is_empty() {
            return 0.0;
        }

        let chars = text.chars().count();
        let mut score = if chars < self.min_chars {
            0.5 + 0.5 * (chars as f32 / self.min_chars.max(1) as f32)
        } else if chars > self.max_chars {
            0.75
        } else {
            1.0
        };

        if !ends_cleanly(text) {
            score -= 0.1;
        }

        let lower = text.to_lowercase();
        let refusals = self
            .refusal_phrases
            .iter()
            .filter(|phrase| lower.contains(phrase.as_str()))
            .count();
        score -= self.phrase_penalty * refusals as f32;

        score.clamp(0.0, 1.0)
    }
}
