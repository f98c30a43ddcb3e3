use async_trait::async_trait;

use super::{SentimentScore, SentimentScorer};
use crate::error::Result;

const POSITIVE_TERMS: &[&str] = &[
    // financial
    "profit", "gain", "growth", "increase", "rise", "bull", "positive", "strong", "good",
    "excellent",
    // political
    "victory", "win", "lead", "ahead", "support", "popular", "favorable", "success", "triumph",
    // general
    "optimistic", "confident", "promising", "bright", "encouraging", "upbeat",
];

const NEGATIVE_TERMS: &[&str] = &[
    "loss", "decline", "fall", "drop", "bear", "negative", "weak", "poor", "terrible",
    "defeat", "lose", "behind", "trail", "scandal", "controversy", "unpopular", "failure",
    "pessimistic", "worried", "concerning", "dark", "discouraging", "bad",
];

/// Hits needed for full confidence
const FULL_CONFIDENCE_HITS: f64 = 10.0;

/// Lexicon scorer counting financial and political polarity terms.
///
/// Terms are matched as substrings of the lowercased text, so "winning" counts
/// toward "win". The score is the positive share minus the negative share.
#[derive(Debug, Clone, Default)]
pub struct KeywordSentimentScorer;

impl KeywordSentimentScorer {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous scoring used by the async trait impl
    pub fn score(&self, text: &str) -> SentimentScore {
        let lowered = text.to_lowercase();
        let count = |terms: &[&str]| -> usize {
            terms.iter().map(|t| lowered.matches(t).count()).sum()
        };

        let positive = count(POSITIVE_TERMS) as f64;
        let negative = count(NEGATIVE_TERMS) as f64;
        let total = positive + negative;
        if total == 0.0 {
            return SentimentScore::NEUTRAL;
        }

        SentimentScore::clamped(
            positive / total - negative / total,
            (total / FULL_CONFIDENCE_HITS).min(1.0),
        )
    }
}

#[async_trait]
impl SentimentScorer for KeywordSentimentScorer {
    async fn score_text(&self, text: &str) -> Result<SentimentScore> {
        Ok(self.score(text))
    }
}
