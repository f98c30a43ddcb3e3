use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{MarketDetail, MarketPage, MarketStatus, OrderResult, SignalDirection};
use crate::error::{AugurError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    Kalshi,
    Paper,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kalshi => "kalshi",
            Self::Paper => "paper",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kalshi" => Ok(Self::Kalshi),
            "paper" | "sim" => Ok(Self::Paper),
            _ => Err("invalid exchange; expected kalshi|paper"),
        }
    }
}

pub fn parse_exchange_kind(raw: &str) -> Result<ExchangeKind> {
    ExchangeKind::from_str(raw).map_err(|e| AugurError::Validation(e.to_string()))
}

/// Market/exchange gateway.
///
/// Every call may fail; the engine treats failures as transient and retries on
/// the next cycle. Retry, rate limiting and auth are the gateway's business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketGateway: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Cheap connectivity check used before the engine starts
    async fn ping(&self) -> Result<()>;

    async fn list_markets(
        &self,
        status: Option<MarketStatus>,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<MarketPage>;

    async fn get_market(&self, market_id: &str) -> Result<MarketDetail>;

    /// Place an order; `price = None` means a market order
    async fn place_order(
        &self,
        market_id: &str,
        direction: SignalDirection,
        quantity: i64,
        price: Option<Decimal>,
    ) -> Result<OrderResult>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Pull fresh markets and quotes into the repository. `Ok(false)` means no
    /// usable data was obtained this time.
    async fn sync_market_data(&self) -> Result<bool>;
}
