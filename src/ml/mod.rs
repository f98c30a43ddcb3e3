//! Text sentiment scoring.
//!
//! Strategies depend on the [`SentimentScorer`] trait only; the bundled
//! [`KeywordSentimentScorer`] is a lexicon model that needs no external service.

mod keyword;

pub use keyword::KeywordSentimentScorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Scalar sentiment for one piece of text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    /// Signed polarity in [-1, 1]
    pub score: f64,
    /// How much evidence backed the score, in [0, 1]
    pub confidence: f64,
}

impl SentimentScore {
    pub const NEUTRAL: SentimentScore = SentimentScore {
        score: 0.0,
        confidence: 0.0,
    };

    /// Clamp both fields into their documented ranges
    pub fn clamped(score: f64, confidence: f64) -> Self {
        let score = if score.is_finite() { score.clamp(-1.0, 1.0) } else { 0.0 };
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { score, confidence }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score_text(&self, text: &str) -> Result<SentimentScore>;
}
