//! Core strategy trait
//!
//! Defines the common interface that all signal-generating strategies implement.
//! Only `name` and `generate_signals` are required; the lifecycle hooks have
//! pass-through defaults.

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{MarketSnapshot, Signal};
use crate::error::{Result, SignalRejection};

// ============================================================================
// Strategy Trait
// ============================================================================

#[async_trait]
pub trait SignalStrategy: Send + Sync {
    /// Unique strategy name, also the key for its configured weight
    fn name(&self) -> &str;

    /// Produce candidate signals for one cycle
    async fn generate_signals(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>>;

    /// Transform the snapshot before generation
    async fn preprocess(&self, snapshot: MarketSnapshot) -> Result<MarketSnapshot> {
        Ok(snapshot)
    }

    /// Transform generated signals; the default stamps name and timestamp
    fn postprocess(&self, signals: Vec<Signal>) -> Vec<Signal> {
        stamp_signals(self.name(), signals)
    }

    /// Strategy-specific acceptance rules, applied after the minimum contract
    async fn validate_signal(&self, _signal: &Signal) -> std::result::Result<(), SignalRejection> {
        Ok(())
    }
}

/// Fill in strategy name and generation time where a strategy left them blank
pub fn stamp_signals(strategy: &str, signals: Vec<Signal>) -> Vec<Signal> {
    let now = Utc::now();
    signals
        .into_iter()
        .map(|mut signal| {
            if signal.strategy.is_empty() {
                signal.strategy = strategy.to_string();
            }
            if signal.generated_at.is_none() {
                signal.generated_at = Some(now);
            }
            signal
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalDirection;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stamp_keeps_existing_values() {
        let mut tagged = Signal::new("M1", SignalDirection::Buy, 0.8, dec!(0.05));
        tagged.strategy = "other".to_string();
        let blank = Signal::new("M2", SignalDirection::Sell, 0.7, dec!(0.05));

        let stamped = stamp_signals("sentiment", vec![tagged, blank]);
        assert_eq!(stamped[0].strategy, "other");
        assert_eq!(stamped[1].strategy, "sentiment");
        assert!(stamped.iter().all(|s| s.generated_at.is_some()));
    }
}
