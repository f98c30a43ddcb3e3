use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SignalDirection;

/// Lifecycle status of a listed market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Closed,
    Settled,
    Unknown,
}

impl MarketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Active => "active",
            MarketStatus::Closed => "closed",
            MarketStatus::Settled => "settled",
            MarketStatus::Unknown => "unknown",
        }
    }

    /// Parse exchange-side status strings. Kalshi reports tradable markets as
    /// "open" or "active" depending on the endpoint version.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "open" | "initialized" => MarketStatus::Active,
            "closed" | "paused" => MarketStatus::Closed,
            "settled" | "finalized" | "determined" => MarketStatus::Settled,
            _ => MarketStatus::Unknown,
        }
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A binary prediction market with yes/no prices expressed as probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub status: MarketStatus,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    #[serde(default)]
    pub volume: Decimal,
    #[serde(default)]
    pub open_interest: Decimal,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.status == MarketStatus::Active
    }

    /// Execution price for a direction: yes side for buys, no side for sells
    pub fn price_for(&self, direction: SignalDirection) -> Option<Decimal> {
        match direction {
            SignalDirection::Buy => Some(self.yes_price),
            SignalDirection::Sell => Some(self.no_price),
            SignalDirection::Hold => None,
        }
    }

    /// Category used for grouping; markets without one share the "unknown" bucket
    pub fn category_or_unknown(&self) -> &str {
        self.category.as_deref().unwrap_or("unknown")
    }
}

/// Detailed market view returned by the gateway; currently the same shape as a listing
pub type MarketDetail = Market;

/// One page of a market listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketPage {
    pub markets: Vec<Market>,
    pub cursor: Option<String>,
}

/// Point-in-time set of markets handed to every strategy in a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub markets: Vec<Market>,
    pub taken_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(markets: Vec<Market>) -> Self {
        Self {
            markets,
            taken_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn get(&self, market_id: &str) -> Option<&Market> {
        self.markets.iter().find(|m| m.id == market_id)
    }
}

/// Recorded quote for a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub market_id: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// News item consumed by the sentiment strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
}

impl NewsArticle {
    pub fn full_text(&self) -> String {
        match &self.content {
            Some(content) => format!("{} {}", self.title, content),
            None => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            id: "PRES-24".to_string(),
            title: "Who will win the election?".to_string(),
            subtitle: None,
            category: None,
            status: MarketStatus::Active,
            yes_price: dec!(0.40),
            no_price: dec!(0.62),
            volume: dec!(1000),
            open_interest: Decimal::ZERO,
            close_time: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_price_for_direction() {
        let m = market();
        assert_eq!(m.price_for(SignalDirection::Buy), Some(dec!(0.40)));
        assert_eq!(m.price_for(SignalDirection::Sell), Some(dec!(0.62)));
        assert_eq!(m.price_for(SignalDirection::Hold), None);
        assert_eq!(m.category_or_unknown(), "unknown");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(MarketStatus::parse("open"), MarketStatus::Active);
        assert_eq!(MarketStatus::parse("Active"), MarketStatus::Active);
        assert_eq!(MarketStatus::parse("finalized"), MarketStatus::Settled);
        assert_eq!(MarketStatus::parse("???"), MarketStatus::Unknown);
    }
}
