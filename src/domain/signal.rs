use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque diagnostic payload attached to a signal. The engine never interprets it;
/// strategies may read their own keys back during validation.
pub type FeatureBag = BTreeMap<String, serde_json::Value>;

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "buy",
            SignalDirection::Sell => "sell",
            SignalDirection::Hold => "hold",
        }
    }

    /// Only buy and sell ever reach execution
    pub fn is_tradable(&self) -> bool {
        !matches!(self, SignalDirection::Hold)
    }

    /// Signed multiplier applied to a fill quantity
    pub fn sign(&self) -> i64 {
        match self {
            SignalDirection::Buy => 1,
            SignalDirection::Sell => -1,
            SignalDirection::Hold => 0,
        }
    }
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SignalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(SignalDirection::Buy),
            "sell" => Ok(SignalDirection::Sell),
            "hold" => Ok(SignalDirection::Hold),
            other => Err(format!("unknown signal direction: {other}")),
        }
    }
}

/// A candidate trade proposed by a strategy for one market in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub market_id: String,
    pub direction: SignalDirection,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Suggested position size as a fraction of bankroll
    pub size_fraction: Decimal,
    /// Suggested execution price; the market quote is used when absent
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub features: FeatureBag,
    /// Producing strategy; stamped by the runtime wrapper when left empty
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn new(
        market_id: impl Into<String>,
        direction: SignalDirection,
        confidence: f64,
        size_fraction: Decimal,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            direction,
            confidence,
            size_fraction,
            target_price: None,
            rationale: String::new(),
            features: FeatureBag::new(),
            strategy: String::new(),
            generated_at: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_target_price(mut self, price: Decimal) -> Self {
        self.target_price = Some(price);
        self
    }

    pub fn with_feature(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.features.insert(key.to_string(), value.into());
        self
    }

    pub fn feature_f64(&self, key: &str) -> Option<f64> {
        self.features.get(key).and_then(|v| v.as_f64())
    }

    pub fn feature_str(&self, key: &str) -> Option<&str> {
        self.features.get(key).and_then(|v| v.as_str())
    }

    /// Deduplication key
    pub fn key(&self) -> (&str, SignalDirection) {
        (self.market_id.as_str(), self.direction)
    }
}

/// A signal tagged with its strategy's ranking weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSignal {
    pub signal: Signal,
    pub weight: f64,
}

impl WeightedSignal {
    pub fn new(signal: Signal, weight: f64) -> Self {
        Self { signal, weight }
    }

    pub fn score(&self) -> f64 {
        self.signal.confidence * self.weight
    }
}

/// A persisted signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub market_id: String,
    pub strategy: String,
    pub direction: SignalDirection,
    pub confidence: f64,
    pub rationale: String,
    pub features: FeatureBag,
    pub generated_at: DateTime<Utc>,
    pub executed: bool,
}

impl SignalRecord {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id: signal.market_id.clone(),
            strategy: signal.strategy.clone(),
            direction: signal.direction,
            confidence: signal.confidence,
            rationale: signal.rationale.clone(),
            features: signal.features.clone(),
            generated_at: signal.generated_at.unwrap_or_else(Utc::now),
            executed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_parse_and_sign() {
        assert_eq!("BUY".parse::<SignalDirection>().unwrap(), SignalDirection::Buy);
        assert!("short".parse::<SignalDirection>().is_err());
        assert_eq!(SignalDirection::Sell.sign(), -1);
        assert!(!SignalDirection::Hold.is_tradable());
    }

    #[test]
    fn test_features_roundtrip_through_accessors() {
        let signal = Signal::new("M1", SignalDirection::Buy, 0.8, dec!(0.05))
            .with_feature("zscore", 2.5)
            .with_feature("paired_market", "M2");

        assert_eq!(signal.feature_f64("zscore"), Some(2.5));
        assert_eq!(signal.feature_str("paired_market"), Some("M2"));
        assert_eq!(signal.feature_f64("missing"), None);
    }

    #[test]
    fn test_weighted_score() {
        let signal = Signal::new("M1", SignalDirection::Buy, 0.5, dec!(0.05));
        assert_eq!(WeightedSignal::new(signal, 0.6).score(), 0.3);
    }
}
