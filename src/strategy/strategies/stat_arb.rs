//! Statistical arbitrage
//!
//! Two independent signal sources over the same snapshot:
//! 1. Pairs trades: strongly correlated markets whose current yes-price spread
//!    sits far from its historical mean are expected to revert.
//! 2. Probability arbitrage: mutually exclusive markets in one category whose
//!    yes prices sum well above 1 are overpriced; the two richest are sold.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{Market, MarketSnapshot, Signal, SignalDirection};
use crate::error::{Result, SignalRejection};
use crate::persistence::Repository;
use crate::strategy::calculations::{align_nearest, mean, pearson, population_std, MIN_HISTORY_POINTS};
use crate::strategy::traits::SignalStrategy;

pub const STRATEGY_NAME: &str = "statistical_arbitrage";

const PAIRS_TRADE: &str = "pairs_trade";
const PROBABILITY_ARBITRAGE: &str = "probability_arbitrage";
const EXCLUSIVE_MARKERS: [&str; 3] = ["election", "winner", "president"];

#[derive(Debug, Clone)]
pub struct StatArbConfig {
    pub min_correlation: f64,
    pub zscore_entry: f64,
    pub history_limit: u32,
    /// Max distance between two price points paired by timestamp
    pub alignment_tolerance: Duration,
    pub max_position_fraction: Decimal,
    pub pairs_size_multiplier: Decimal,
    pub probability_size_multiplier: Decimal,
    pub probability_sum_threshold: f64,
    /// Probability signals stay valid while the sum remains above this
    pub probability_validation_floor: f64,
}

impl Default for StatArbConfig {
    fn default() -> Self {
        Self {
            min_correlation: 0.7,
            zscore_entry: 2.0,
            history_limit: 100,
            alignment_tolerance: Duration::hours(1),
            max_position_fraction: dec!(0.10),
            pairs_size_multiplier: dec!(0.5),
            probability_size_multiplier: dec!(0.3),
            probability_sum_threshold: 1.1,
            probability_validation_floor: 1.05,
        }
    }
}

/// A correlated pair with its timestamp-aligned yes prices
#[derive(Debug, Clone)]
struct CorrelatedPair {
    market_a: String,
    market_b: String,
    correlation: f64,
    aligned: Vec<(f64, f64)>,
}

pub struct StatisticalArbitrageStrategy {
    repository: Arc<dyn Repository>,
    config: StatArbConfig,
}

impl StatisticalArbitrageStrategy {
    pub fn new(repository: Arc<dyn Repository>, config: StatArbConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &StatArbConfig {
        &self.config
    }

    // ==================== Pairs trades ====================

    async fn load_histories(&self, markets: &[&Market]) -> BTreeMap<String, Vec<(DateTime<Utc>, f64)>> {
        let mut histories = BTreeMap::new();
        for market in markets {
            let history = match self
                .repository
                .get_price_history(&market.id, self.config.history_limit)
                .await
            {
                Ok(history) => history,
                Err(e) => {
                    warn!(market_id = %market.id, error = %e, "price history unavailable");
                    continue;
                }
            };
            let series: Vec<(DateTime<Utc>, f64)> = history
                .iter()
                .filter_map(|p| p.yes_price.to_f64().map(|yes| (p.timestamp, yes)))
                .collect();
            if series.len() >= MIN_HISTORY_POINTS {
                histories.insert(market.id.clone(), series);
            }
        }
        histories
    }

    fn correlated_pairs(
        &self,
        histories: &BTreeMap<String, Vec<(DateTime<Utc>, f64)>>,
    ) -> Vec<CorrelatedPair> {
        let ids: Vec<&String> = histories.keys().collect();
        let mut pairs = Vec::new();

        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let aligned = align_nearest(&histories[*a], &histories[*b], self.config.alignment_tolerance);
                if aligned.len() < MIN_HISTORY_POINTS {
                    continue;
                }
                let (xs, ys): (Vec<f64>, Vec<f64>) = aligned.iter().copied().unzip();
                let Some(correlation) = pearson(&xs, &ys) else {
                    continue;
                };
                if correlation.abs() >= self.config.min_correlation {
                    pairs.push(CorrelatedPair {
                        market_a: (*a).clone(),
                        market_b: (*b).clone(),
                        correlation,
                        aligned,
                    });
                }
            }
        }

        pairs.sort_by(|x, y| y.correlation.abs().total_cmp(&x.correlation.abs()));
        debug!("Found {} correlated market pairs", pairs.len());
        pairs
    }

    fn pairs_signals(&self, snapshot: &MarketSnapshot, pairs: &[CorrelatedPair]) -> Vec<Signal> {
        let size = self.config.max_position_fraction * self.config.pairs_size_multiplier;
        let mut signals = Vec::new();

        for pair in pairs {
            let (Some(a), Some(b)) = (snapshot.get(&pair.market_a), snapshot.get(&pair.market_b)) else {
                continue;
            };
            let (Some(price_a), Some(price_b)) = (a.yes_price.to_f64(), b.yes_price.to_f64()) else {
                continue;
            };
            let spread = price_a - price_b;
            let Some(zscore) = spread_zscore(&pair.aligned, spread) else {
                continue;
            };
            if zscore.abs() < self.config.zscore_entry {
                continue;
            }

            let (action_a, action_b) = pair_directions(zscore);
            let confidence = (zscore.abs() / 4.0).min(1.0) * pair.correlation.abs();
            let rationale = format!(
                "Pairs trade: z-score={:.2}, correlation={:.2}",
                zscore, pair.correlation
            );

            for (market, action, paired, paired_action) in [
                (&pair.market_a, action_a, &pair.market_b, action_b),
                (&pair.market_b, action_b, &pair.market_a, action_a),
            ] {
                signals.push(
                    Signal::new(market.as_str(), action, confidence, size)
                        .with_rationale(rationale.clone())
                        .with_feature("arbitrage_type", PAIRS_TRADE)
                        .with_feature("zscore", zscore)
                        .with_feature("correlation", pair.correlation)
                        .with_feature("spread", spread)
                        .with_feature("paired_market", paired.as_str())
                        .with_feature("paired_action", paired_action.as_str()),
                );
            }
        }
        signals
    }

    // ==================== Probability arbitrage ====================

    fn probability_signals(&self, markets: &[&Market]) -> Vec<Signal> {
        let mut groups: BTreeMap<&str, Vec<&Market>> = BTreeMap::new();
        for market in markets {
            groups.entry(market.category_or_unknown()).or_default().push(*market);
        }

        let size = self.config.max_position_fraction * self.config.probability_size_multiplier;
        let mut signals = Vec::new();

        for (category, mut group) in groups {
            if group.len() < 2 || !looks_mutually_exclusive(group.iter().map(|m| m.title.as_str())) {
                continue;
            }
            let total: Decimal = group.iter().map(|m| m.yes_price).sum();
            let total = total.to_f64().unwrap_or(0.0);
            if total <= self.config.probability_sum_threshold {
                continue;
            }

            group.sort_by(|x, y| y.yes_price.cmp(&x.yes_price));
            let related: Vec<String> = group.iter().map(|m| m.id.clone()).collect();
            let confidence = ((total - 1.0) * 2.0).min(1.0);
            debug!(%category, total, "probability sum violation");

            for market in group.iter().take(2) {
                signals.push(
                    Signal::new(market.id.as_str(), SignalDirection::Sell, confidence, size)
                        .with_rationale(format!("Probability arbitrage: total_prob={:.2}", total))
                        .with_feature("arbitrage_type", PROBABILITY_ARBITRAGE)
                        .with_feature("total_probability", total)
                        .with_feature("arbitrage_amount", total - 1.0)
                        .with_feature("related_markets", related.clone()),
                );
            }
        }
        signals
    }
}

#[async_trait]
impl SignalStrategy for StatisticalArbitrageStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn generate_signals(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        let active: Vec<&Market> = snapshot.markets.iter().filter(|m| m.is_active()).collect();
        if active.len() < 2 {
            return Ok(Vec::new());
        }

        let histories = self.load_histories(&active).await;
        let pairs = self.correlated_pairs(&histories);

        let mut signals = self.pairs_signals(snapshot, &pairs);
        signals.extend(self.probability_signals(&active));

        info!("Generated {} statistical arbitrage signals", signals.len());
        Ok(signals)
    }

    async fn validate_signal(&self, signal: &Signal) -> std::result::Result<(), SignalRejection> {
        match signal.feature_str("arbitrage_type") {
            Some(PAIRS_TRADE) => {
                if signal.feature_str("paired_market").map_or(true, str::is_empty) {
                    return Err(SignalRejection::StrategyRule("pairs trade without paired market".into()));
                }
                let correlation = signal.feature_f64("correlation").unwrap_or(0.0);
                if correlation.abs() < self.config.min_correlation {
                    return Err(SignalRejection::StrategyRule(format!(
                        "correlation {correlation:.2} below {:.2}",
                        self.config.min_correlation
                    )));
                }
                let zscore = signal.feature_f64("zscore").unwrap_or(0.0);
                if zscore.abs() < self.config.zscore_entry {
                    return Err(SignalRejection::StrategyRule(format!(
                        "z-score {zscore:.2} below entry {:.2}",
                        self.config.zscore_entry
                    )));
                }
                Ok(())
            }
            Some(PROBABILITY_ARBITRAGE) => {
                let total = signal.feature_f64("total_probability").unwrap_or(0.0);
                if total <= self.config.probability_validation_floor {
                    return Err(SignalRejection::StrategyRule(format!(
                        "total probability {total:.2} no longer overpriced"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ==================== Helpers ====================

/// Z-score of `current_spread` against the historical `a - b` spreads.
///
/// `None` with too little history or a constant spread.
pub fn spread_zscore(aligned: &[(f64, f64)], current_spread: f64) -> Option<f64> {
    if aligned.len() < MIN_HISTORY_POINTS {
        return None;
    }
    let spreads: Vec<f64> = aligned.iter().map(|(a, b)| a - b).collect();
    let std = population_std(&spreads)?;
    if std == 0.0 {
        return None;
    }
    Some((current_spread - mean(&spreads)?) / std)
}

/// A wide spread sells the rich leg and buys the cheap one
pub fn pair_directions(zscore: f64) -> (SignalDirection, SignalDirection) {
    if zscore > 0.0 {
        (SignalDirection::Sell, SignalDirection::Buy)
    } else {
        (SignalDirection::Buy, SignalDirection::Sell)
    }
}

pub fn looks_mutually_exclusive<'a>(mut titles: impl Iterator<Item = &'a str>) -> bool {
    titles.any(|title| {
        let title = title.to_lowercase();
        EXCLUSIVE_MARKERS.iter().any(|marker| title.contains(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{MarketStatus, PricePoint};
    use approx::assert_relative_eq;

    fn market(id: &str, title: &str, category: Option<&str>, yes: Decimal) -> Market {
        Market {
            id: id.to_string(),
            title: title.to_string(),
            subtitle: None,
            category: category.map(str::to_string),
            status: MarketStatus::Active,
            yes_price: yes,
            no_price: Decimal::ONE - yes,
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            close_time: None,
            updated_at: Utc::now(),
        }
    }

    fn strategy(repo: Arc<InMemoryRepository>) -> StatisticalArbitrageStrategy {
        StatisticalArbitrageStrategy::new(repo, StatArbConfig::default())
    }

    #[test]
    fn test_spread_zscore() {
        let aligned: Vec<(f64, f64)> = (0..10)
            .map(|i| if i % 2 == 0 { (0.5, 0.4) } else { (0.5, 0.3) })
            .collect();
        // spreads alternate 0.1 / 0.2: mean 0.15, std 0.05
        assert_relative_eq!(spread_zscore(&aligned, 0.25).expect("z"), 2.0, epsilon = 1e-9);
        assert!(spread_zscore(&aligned[..5], 0.25).is_none());
        assert!(spread_zscore(&[(0.75, 0.5); 12], 0.3).is_none());
    }

    #[test]
    fn test_pair_directions_and_exclusivity() {
        assert_eq!(pair_directions(2.5), (SignalDirection::Sell, SignalDirection::Buy));
        assert_eq!(pair_directions(-2.5), (SignalDirection::Buy, SignalDirection::Sell));
        assert!(looks_mutually_exclusive(["Who wins the ELECTION?"].into_iter()));
        assert!(!looks_mutually_exclusive(["Will it rain?", "CPI above 3%"].into_iter()));
    }

    #[tokio::test]
    async fn test_pairs_trade_on_diverged_spread() {
        let repo = Arc::new(InMemoryRepository::new());
        let start = Utc::now() - Duration::hours(2);
        for i in 0..20i64 {
            let a = dec!(0.30) + dec!(0.01) * Decimal::from(i);
            let wobble = if i % 2 == 0 { dec!(0.005) } else { dec!(-0.005) };
            let b = dec!(0.20) + dec!(0.01) * Decimal::from(i) + wobble;
            for (id, yes) in [("A", a), ("B", b)] {
                repo.push_price_point(PricePoint {
                    market_id: id.to_string(),
                    yes_price: yes,
                    no_price: Decimal::ONE - yes,
                    volume: None,
                    timestamp: start + Duration::minutes(i),
                });
            }
        }

        // Historical spread ~0.10, current spread 0.20
        let snapshot = MarketSnapshot::new(vec![
            market("A", "Rate cut in March", None, dec!(0.60)),
            market("B", "Rate cut in June", None, dec!(0.40)),
        ]);
        let signals = strategy(repo).generate_signals(&snapshot).await.expect("signals");

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].market_id, "A");
        assert_eq!(signals[0].direction, SignalDirection::Sell);
        assert_eq!(signals[1].market_id, "B");
        assert_eq!(signals[1].direction, SignalDirection::Buy);
        assert_eq!(signals[0].feature_str("paired_market"), Some("B"));
        assert_eq!(signals[1].feature_str("paired_action"), Some("sell"));
        assert_eq!(signals[0].size_fraction, dec!(0.05));
        assert!(signals[0].feature_f64("zscore").expect("z") > 2.0);
        assert!(signals[0].confidence > 0.9 && signals[0].confidence <= 1.0);
    }

    #[tokio::test]
    async fn test_probability_arbitrage_sells_two_richest() {
        let repo = Arc::new(InMemoryRepository::new());
        let snapshot = MarketSnapshot::new(vec![
            market("X", "Will X win the election?", Some("politics"), dec!(0.30)),
            market("Y", "Will Y win the election?", Some("politics"), dec!(0.50)),
            market("Z", "Will Z win the election?", Some("politics"), dec!(0.45)),
            market("W", "Will it snow?", Some("weather"), dec!(0.90)),
        ]);

        let signals = strategy(repo).generate_signals(&snapshot).await.expect("signals");
        let ids: Vec<&str> = signals.iter().map(|s| s.market_id.as_str()).collect();
        assert_eq!(ids, vec!["Y", "Z"]);
        assert!(signals.iter().all(|s| s.direction == SignalDirection::Sell));
        assert_relative_eq!(signals[0].confidence, 0.5, epsilon = 1e-9);
        assert_eq!(signals[0].size_fraction, dec!(0.03));
        assert_relative_eq!(
            signals[0].feature_f64("total_probability").expect("total"),
            1.25,
            epsilon = 1e-9
        );
    }

    #[tokio::test]
    async fn test_single_market_yields_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        let snapshot = MarketSnapshot::new(vec![market("A", "Lonely", None, dec!(0.5))]);
        assert!(strategy(repo).generate_signals(&snapshot).await.expect("signals").is_empty());
    }

    #[tokio::test]
    async fn test_validate_signal_rules() {
        let s = strategy(Arc::new(InMemoryRepository::new()));

        let weak = Signal::new("A", SignalDirection::Buy, 0.8, dec!(0.05))
            .with_feature("arbitrage_type", PAIRS_TRADE)
            .with_feature("paired_market", "B")
            .with_feature("correlation", 0.9)
            .with_feature("zscore", 1.5);
        assert!(s.validate_signal(&weak).await.is_err());

        let strong = weak.clone().with_feature("zscore", -2.5);
        assert!(s.validate_signal(&strong).await.is_ok());

        let stale = Signal::new("Y", SignalDirection::Sell, 0.5, dec!(0.03))
            .with_feature("arbitrage_type", PROBABILITY_ARBITRAGE)
            .with_feature("total_probability", 1.04);
        assert!(s.validate_signal(&stale).await.is_err());

        let plain = Signal::new("Q", SignalDirection::Buy, 0.8, dec!(0.05));
        assert!(s.validate_signal(&plain).await.is_ok());
    }
}
