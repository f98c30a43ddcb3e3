//! Strategy implementations
//!
//! Contains the built-in signal sources:
//! - StatisticalArbitrageStrategy: pairs trades and probability-sum arbitrage
//! - SentimentStrategy: news sentiment with momentum and volume confirmation

pub mod sentiment;
pub mod stat_arb;

pub use sentiment::{SentimentConfig, SentimentStrategy};
pub use stat_arb::{StatArbConfig, StatisticalArbitrageStrategy};

use std::sync::Arc;

use super::traits::SignalStrategy;
use crate::config::AppConfig;
use crate::ml::SentimentScorer;
use crate::persistence::Repository;

/// The built-in strategies in registration order, sized from the trading config
pub fn builtin_strategies(
    config: &AppConfig,
    repository: Arc<dyn Repository>,
    scorer: Arc<dyn SentimentScorer>,
) -> Vec<Arc<dyn SignalStrategy>> {
    let max_position_fraction = config.trading.max_position_fraction;

    let sentiment = SentimentStrategy::new(
        repository.clone(),
        scorer,
        SentimentConfig {
            max_position_fraction,
            ..SentimentConfig::default()
        },
    );
    let stat_arb = StatisticalArbitrageStrategy::new(
        repository,
        StatArbConfig {
            max_position_fraction,
            ..StatArbConfig::default()
        },
    );

    vec![Arc::new(sentiment), Arc::new(stat_arb)]
}
