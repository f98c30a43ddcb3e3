//! News sentiment strategy
//!
//! For each active market:
//! 1. Skip markets too similar (category or keywords) to something already held
//! 2. Score recent news that mentions the market's keywords
//! 3. Blend aggregate sentiment, sentiment momentum and volume activity
//! 4. Emit buy on strong positive sentiment, sell on strong negative

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{Market, MarketSnapshot, NewsArticle, PricePoint, Signal, SignalDirection};
use crate::error::{Result, SignalRejection};
use crate::ml::SentimentScorer;
use crate::persistence::Repository;
use crate::strategy::calculations::{mean, pearson, weighted_slope, MIN_HISTORY_POINTS};
use crate::strategy::traits::SignalStrategy;

pub const STRATEGY_NAME: &str = "sentiment";

const SAME_CATEGORY_CORRELATION: f64 = 0.7;
const RECENT_VOLUME_POINTS: usize = 10;
const HISTORICAL_VOLUME_POINTS: usize = 50;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "and", "any", "are", "because", "been",
    "before", "being", "below", "between", "both", "but", "can", "did", "does", "doing", "down",
    "during", "each", "few", "for", "from", "further", "had", "has", "have", "having", "her",
    "here", "hers", "herself", "him", "himself", "his", "how", "into", "its", "itself", "just",
    "more", "most", "myself", "nor", "not", "now", "off", "once", "only", "other", "our", "ours",
    "out", "over", "own", "same", "she", "should", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "through", "too", "under", "until",
    "very", "was", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours",
];

const POLITICAL_TRIGGERS: [&str; 4] = ["election", "president", "congress", "senate"];
const POLITICAL_EXPANSION: [&str; 4] = ["politics", "vote", "campaign", "poll"];
const ECONOMIC_TRIGGERS: [&str; 4] = ["economy", "gdp", "inflation", "fed"];
const ECONOMIC_EXPANSION: [&str; 4] = ["economic", "financial", "market", "rate"];

#[derive(Debug, Clone)]
pub struct SentimentConfig {
    pub min_sentiment: f64,
    pub min_confidence: f64,
    /// Articles older than this carry no momentum weight
    pub momentum_window_hours: f64,
    pub volume_threshold: f64,
    pub max_position_correlation: f64,
    pub news_lookback_hours: u32,
    pub news_min_relevance: f64,
    /// Keyword relevance an article needs to be scored for a market
    pub article_min_relevance: f64,
    pub history_limit: u32,
    pub max_position_fraction: Decimal,
    pub size_cap_multiplier: Decimal,
    /// Minimum gap between unexecuted signals on the same market
    pub signal_cooldown: Duration,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            min_sentiment: 0.6,
            min_confidence: 0.7,
            momentum_window_hours: 6.0,
            volume_threshold: 1.5,
            max_position_correlation: 0.8,
            news_lookback_hours: 24,
            news_min_relevance: 0.3,
            article_min_relevance: 0.1,
            history_limit: 100,
            max_position_fraction: dec!(0.10),
            size_cap_multiplier: dec!(1.5),
            signal_cooldown: Duration::hours(1),
        }
    }
}

// ==================== Analysis results ====================

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredArticle {
    published_at: DateTime<Utc>,
    score: f64,
    confidence: f64,
    relevance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateSentiment {
    pub sentiment: f64,
    pub confidence: f64,
    pub article_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Positive,
    Negative,
    Neutral,
    Increasing,
    Decreasing,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Positive => "positive",
            Trend::Negative => "negative",
            Trend::Neutral => "neutral",
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Momentum {
    /// Weighted least-squares slope of decayed sentiment per second
    pub momentum: f64,
    pub trend: Trend,
    pub strength: f64,
    pub data_points: usize,
}

impl Momentum {
    const FLAT: Momentum = Momentum {
        momentum: 0.0,
        trend: Trend::Neutral,
        strength: 0.0,
        data_points: 0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolumeActivity {
    /// Signed activity in [-1, 1]
    pub signal: f64,
    pub trend: Trend,
    pub ratio: f64,
    pub price_correlation: f64,
}

impl VolumeActivity {
    const QUIET: VolumeActivity = VolumeActivity {
        signal: 0.0,
        trend: Trend::Neutral,
        ratio: 1.0,
        price_correlation: 0.0,
    };
}

// ==================== Strategy ====================

pub struct SentimentStrategy {
    repository: Arc<dyn Repository>,
    scorer: Arc<dyn SentimentScorer>,
    config: SentimentConfig,
    keyword_cache: DashMap<String, BTreeSet<String>>,
}

impl SentimentStrategy {
    pub fn new(
        repository: Arc<dyn Repository>,
        scorer: Arc<dyn SentimentScorer>,
        config: SentimentConfig,
    ) -> Self {
        Self {
            repository,
            scorer,
            config,
            keyword_cache: DashMap::new(),
        }
    }

    fn keywords(&self, market: &Market) -> BTreeSet<String> {
        let cache_key = format!("{}\u{1f}{}", market.title, market.subtitle.as_deref().unwrap_or(""));
        if let Some(cached) = self.keyword_cache.get(&cache_key) {
            return cached.clone();
        }
        let keywords = extract_keywords(&market.title, market.subtitle.as_deref());
        self.keyword_cache.insert(cache_key, keywords.clone());
        keywords
    }

    /// Highest similarity between `market` and any held position's market
    async fn position_correlation(&self, market: &Market) -> Result<f64> {
        let positions = self.repository.get_active_positions().await?;
        if positions.is_empty() {
            return Ok(0.0);
        }

        let target_keywords = self.keywords(market);
        let mut highest: f64 = 0.0;
        for position in positions {
            let Some(held) = self.repository.get_market(&position.market_id).await? else {
                continue;
            };
            if held.category.is_some() && held.category == market.category {
                highest = highest.max(SAME_CATEGORY_CORRELATION);
            }
            highest = highest.max(jaccard(&target_keywords, &self.keywords(&held)));
        }
        Ok(highest)
    }

    async fn score_articles(
        &self,
        keywords: &BTreeSet<String>,
        articles: &[NewsArticle],
    ) -> Vec<ScoredArticle> {
        let mut scored = Vec::new();
        for article in articles {
            let relevance = keyword_relevance(&article.full_text(), keywords);
            if relevance <= self.config.article_min_relevance {
                continue;
            }
            // Title counted twice for emphasis
            let text = format!("{} {}", article.title, article.full_text());
            match self.scorer.score_text(&text).await {
                Ok(sentiment) => scored.push(ScoredArticle {
                    published_at: article.published_at,
                    score: sentiment.score,
                    confidence: sentiment.confidence,
                    relevance,
                }),
                Err(e) => debug!(title = %article.title, error = %e, "article scoring failed"),
            }
        }
        scored
    }

    fn momentum(&self, articles: &[ScoredArticle], now: DateTime<Utc>) -> Momentum {
        sentiment_momentum(articles, now, self.config.momentum_window_hours)
    }

    async fn volume_activity(&self, market_id: &str) -> VolumeActivity {
        match self
            .repository
            .get_price_history(market_id, self.config.history_limit)
            .await
        {
            Ok(history) => volume_activity(&history, self.config.volume_threshold),
            Err(e) => {
                warn!(%market_id, error = %e, "price history unavailable");
                VolumeActivity::QUIET
            }
        }
    }

    fn position_size(&self, confidence: f64, aligned: bool, momentum: &Momentum, volume: &VolumeActivity) -> Decimal {
        let base = self.config.max_position_fraction.to_f64().unwrap_or(0.0);
        let mut size = base * confidence;
        if aligned {
            size *= 1.0 + momentum.strength * 0.5;
        } else {
            size *= 1.0 - momentum.strength * 0.3;
        }
        size *= 1.0 + volume.signal * 0.2;

        let cap = self.config.max_position_fraction * self.config.size_cap_multiplier;
        Decimal::from_f64(size)
            .map(|d| d.round_dp(6))
            .unwrap_or(Decimal::ZERO)
            .clamp(Decimal::ZERO, cap)
    }

    async fn analyze_market(&self, market: &Market, news: &[NewsArticle]) -> Result<Option<Signal>> {
        let correlation = self.position_correlation(market).await?;
        if correlation > self.config.max_position_correlation {
            info!("Skipping {} due to high correlation: {:.2}", market.id, correlation);
            return Ok(None);
        }

        let keywords = self.keywords(market);
        let articles = self.score_articles(&keywords, news).await;
        if articles.is_empty() {
            return Ok(None);
        }

        let aggregate = aggregate_sentiment(&articles);
        let momentum = self.momentum(&articles, Utc::now());
        let volume = self.volume_activity(&market.id).await;
        let confidence = combined_confidence(&aggregate, &momentum, &volume);

        if aggregate.sentiment.abs() < self.config.min_sentiment || confidence < self.config.min_confidence {
            return Ok(None);
        }

        let (direction, target_price, wanted_trend) = if aggregate.sentiment > 0.0 {
            (SignalDirection::Buy, market.yes_price, Trend::Positive)
        } else {
            (SignalDirection::Sell, market.no_price, Trend::Negative)
        };
        let size = self.position_size(confidence, momentum.trend == wanted_trend, &momentum, &volume);

        info!(
            "Generated {} signal for {}: sentiment={:.3}, confidence={:.3}",
            direction, market.id, aggregate.sentiment, confidence
        );

        let signal = Signal::new(market.id.as_str(), direction, confidence, size)
            .with_target_price(target_price)
            .with_rationale(format!(
                "Sentiment: {:.3}, Momentum: {}, Volume: {}",
                aggregate.sentiment,
                momentum.trend.as_str(),
                volume.trend.as_str()
            ))
            .with_feature("sentiment_score", aggregate.sentiment)
            .with_feature("sentiment_confidence", aggregate.confidence)
            .with_feature("momentum", serde_json::to_value(momentum)?)
            .with_feature("volume", serde_json::to_value(volume)?)
            .with_feature("article_count", aggregate.article_count)
            .with_feature("correlation", correlation);
        Ok(Some(signal))
    }
}

#[async_trait]
impl SignalStrategy for SentimentStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn generate_signals(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        let news = self
            .repository
            .get_recent_news(self.config.news_lookback_hours, self.config.news_min_relevance)
            .await?;
        if news.is_empty() {
            debug!("No recent news, sentiment strategy idle");
            return Ok(Vec::new());
        }

        let mut signals = Vec::new();
        for market in snapshot.markets.iter().filter(|m| m.is_active()) {
            match self.analyze_market(market, &news).await {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(e) => warn!(market_id = %market.id, error = %e, "sentiment analysis failed"),
            }
        }
        Ok(signals)
    }

    async fn validate_signal(&self, signal: &Signal) -> std::result::Result<(), SignalRejection> {
        let market = self
            .repository
            .get_market(&signal.market_id)
            .await
            .map_err(|e| SignalRejection::Lookup(e.to_string()))?;
        match market {
            Some(m) if m.is_active() => {}
            Some(_) => return Err(SignalRejection::InactiveMarket(signal.market_id.clone())),
            None => return Err(SignalRejection::UnknownMarket(signal.market_id.clone())),
        }

        if signal.confidence < self.config.min_confidence {
            return Err(SignalRejection::BelowMinConfidence {
                confidence: signal.confidence,
                min: self.config.min_confidence,
            });
        }

        let pending = self
            .repository
            .get_pending_signals(Some(STRATEGY_NAME))
            .await
            .map_err(|e| SignalRejection::Lookup(e.to_string()))?;
        let cutoff = Utc::now() - self.config.signal_cooldown;
        if pending
            .iter()
            .any(|p| p.market_id == signal.market_id && p.generated_at > cutoff)
        {
            return Err(SignalRejection::StrategyRule(format!(
                "pending signal on {} within cooldown",
                signal.market_id
            )));
        }
        Ok(())
    }
}

// ==================== Pure analysis ====================

/// Lowercased title/subtitle tokens minus stopwords and short words, plus topical expansions
pub fn extract_keywords(title: &str, subtitle: Option<&str>) -> BTreeSet<String> {
    let mut text = title.to_lowercase();
    if let Some(subtitle) = subtitle {
        text.push(' ');
        text.push_str(&subtitle.to_lowercase());
    }
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    let mut keywords: BTreeSet<String> = cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();

    if POLITICAL_TRIGGERS.iter().any(|w| cleaned.contains(w)) {
        keywords.extend(POLITICAL_EXPANSION.iter().map(|w| w.to_string()));
    }
    if ECONOMIC_TRIGGERS.iter().any(|w| cleaned.contains(w)) {
        keywords.extend(ECONOMIC_EXPANSION.iter().map(|w| w.to_string()));
    }
    keywords
}

/// Keyword occurrences in `text` per keyword
pub fn keyword_relevance(text: &str, keywords: &BTreeSet<String>) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let text = text.to_lowercase();
    let hits: usize = keywords.iter().map(|k| text.matches(k.as_str()).count()).sum();
    hits as f64 / keywords.len() as f64
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.union(b).count();
    shared as f64 / union as f64
}

fn aggregate_sentiment(articles: &[ScoredArticle]) -> AggregateSentiment {
    let total_weight: f64 = articles.iter().map(|a| a.relevance * a.confidence).sum();
    let weighted: f64 = articles
        .iter()
        .map(|a| a.score * a.relevance * a.confidence)
        .sum();
    let sentiment = if total_weight > 0.0 { weighted / total_weight } else { 0.0 };
    let confidence = if articles.is_empty() {
        0.0
    } else {
        (total_weight / articles.len() as f64).min(1.0)
    };
    AggregateSentiment {
        sentiment,
        confidence,
        article_count: articles.len(),
    }
}

/// Trend of time-decayed sentiment over the momentum window
fn sentiment_momentum(articles: &[ScoredArticle], now: DateTime<Utc>, window_hours: f64) -> Momentum {
    let mut sorted = articles.to_vec();
    sorted.sort_by_key(|a| a.published_at);

    let decayed: Vec<(DateTime<Utc>, f64, f64)> = sorted
        .iter()
        .filter_map(|a| {
            let age_hours = (now - a.published_at).num_milliseconds() as f64 / 3_600_000.0;
            let weight = (1.0 - age_hours / window_hours).max(0.0);
            (weight > 0.0).then(|| (a.published_at, a.score * weight * a.confidence, weight))
        })
        .collect();
    if decayed.len() < 2 {
        return Momentum::FLAT;
    }

    let origin = decayed[0].0;
    let times: Vec<f64> = decayed
        .iter()
        .map(|(ts, _, _)| (*ts - origin).num_milliseconds() as f64 / 1000.0)
        .collect();
    let scores: Vec<f64> = decayed.iter().map(|(_, s, _)| *s).collect();
    let weights: Vec<f64> = decayed.iter().map(|(_, _, w)| *w).collect();

    let momentum = weighted_slope(&times, &scores, &weights).unwrap_or(0.0);
    let trend = if momentum > 0.01 {
        Trend::Positive
    } else if momentum < -0.01 {
        Trend::Negative
    } else {
        Trend::Neutral
    };
    Momentum {
        momentum,
        trend,
        strength: (momentum.abs() * 100.0).min(1.0),
        data_points: decayed.len(),
    }
}

/// Recent vs historical volume from a newest-first price history
pub fn volume_activity(history: &[PricePoint], threshold: f64) -> VolumeActivity {
    if history.len() < MIN_HISTORY_POINTS {
        return VolumeActivity::QUIET;
    }

    let volumes: Vec<f64> = history
        .iter()
        .map(|p| p.volume.and_then(|v| v.to_f64()).unwrap_or(0.0))
        .collect();
    if volumes.iter().sum::<f64>() == 0.0 {
        return VolumeActivity::QUIET;
    }

    let changes: Vec<f64> = history
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let previous = history.get(i + 1).map_or(p.yes_price, |q| q.yes_price);
            (p.yes_price - previous).abs().to_f64().unwrap_or(0.0)
        })
        .collect();

    let recent = mean(&volumes[..RECENT_VOLUME_POINTS.min(volumes.len())]).unwrap_or(0.0);
    let tail_start = volumes.len().saturating_sub(HISTORICAL_VOLUME_POINTS);
    let historical = mean(&volumes[tail_start..]).unwrap_or(0.0);
    let ratio = if historical > 0.0 { recent / historical } else { 1.0 };
    let price_correlation = pearson(&volumes, &changes).unwrap_or(0.0);

    let (signal, trend) = if ratio > threshold && price_correlation > 0.3 {
        (((ratio - 1.0) * 0.5).min(1.0), Trend::Increasing)
    } else if ratio < 1.0 / threshold {
        (-((1.0 - ratio) * 0.5).min(1.0), Trend::Decreasing)
    } else {
        (0.0, Trend::Neutral)
    };

    VolumeActivity {
        signal,
        trend,
        ratio,
        price_correlation,
    }
}

fn combined_confidence(aggregate: &AggregateSentiment, momentum: &Momentum, volume: &VolumeActivity) -> f64 {
    let consistency = if momentum.data_points >= 3 { 1.0 } else { 0.5 };
    let confidence = aggregate.confidence * 0.4
        + aggregate.sentiment.abs() * 0.3
        + momentum.strength * consistency * 0.2
        + volume.signal.abs() * 0.1;
    confidence.min(1.0)
}
