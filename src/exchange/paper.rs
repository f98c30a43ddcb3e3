//! In-memory paper gateway
//!
//! Holds a market book that can be seeded from a JSON file or moved by hand,
//! fills market orders immediately at the side price, and pushes the book into
//! the repository on every sync.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::{ExchangeKind, MarketGateway};
use crate::domain::{Market, MarketDetail, MarketPage, MarketStatus, OrderResult, SignalDirection};
use crate::error::{AugurError, Result};
use crate::persistence::Repository;

pub struct PaperGateway {
    book: RwLock<BTreeMap<String, Market>>,
    repository: Arc<dyn Repository>,
    order_seq: AtomicU64,
}

impl PaperGateway {
    pub fn new(repository: Arc<dyn Repository>, markets: Vec<Market>) -> Self {
        let book = markets.into_iter().map(|m| (m.id.clone(), m)).collect();
        Self {
            book: RwLock::new(book),
            repository,
            order_seq: AtomicU64::new(0),
        }
    }

    /// Seed the book from a JSON array of markets
    pub fn from_json_file(path: impl AsRef<Path>, repository: Arc<dyn Repository>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let markets: Vec<Market> = serde_json::from_str(&raw)?;
        info!(
            "Loaded {} paper markets from {}",
            markets.len(),
            path.as_ref().display()
        );
        Ok(Self::new(repository, markets))
    }

    pub async fn upsert(&self, market: Market) {
        self.book.write().await.insert(market.id.clone(), market);
    }

    /// Move a market's quote
    pub async fn set_quote(&self, market_id: &str, yes_price: Decimal, no_price: Decimal) -> Result<()> {
        let mut book = self.book.write().await;
        let market = book
            .get_mut(market_id)
            .ok_or_else(|| AugurError::MarketNotFound(market_id.to_string()))?;
        market.yes_price = yes_price;
        market.no_price = no_price;
        market.updated_at = Utc::now();
        Ok(())
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.order_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl MarketGateway for PaperGateway {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Paper
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_markets(
        &self,
        status: Option<MarketStatus>,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<MarketPage> {
        let offset = match cursor.as_deref() {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| AugurError::Validation(format!("invalid cursor: {raw}")))?,
            None => 0,
        };

        let book = self.book.read().await;
        let filtered: Vec<&Market> = book
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .collect();

        let end = offset.saturating_add(limit as usize).min(filtered.len());
        let markets: Vec<Market> = filtered
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|m| (*m).clone())
            .collect();
        let cursor = (end < filtered.len()).then(|| end.to_string());

        Ok(MarketPage { markets, cursor })
    }

    async fn get_market(&self, market_id: &str) -> Result<MarketDetail> {
        self.book
            .read()
            .await
            .get(market_id)
            .cloned()
            .ok_or_else(|| AugurError::MarketNotFound(market_id.to_string()))
    }

    async fn place_order(
        &self,
        market_id: &str,
        direction: SignalDirection,
        quantity: i64,
        price: Option<Decimal>,
    ) -> Result<OrderResult> {
        if quantity <= 0 {
            return Err(AugurError::Validation(format!(
                "order quantity must be positive, got {quantity}"
            )));
        }

        let market = self.get_market(market_id).await?;
        if !market.is_active() {
            return Err(AugurError::OrderRejected(format!(
                "market {market_id} is {}",
                market.status
            )));
        }

        let side_price = market.price_for(direction).ok_or_else(|| {
            AugurError::OrderRejected(format!("cannot place a {direction} order"))
        })?;

        let order_id = self.next_order_id();

        // Limit orders that would not cross rest unfilled
        if let Some(limit) = price {
            if limit < side_price {
                debug!(%order_id, %market_id, %limit, %side_price, "paper limit order resting");
                return Ok(OrderResult {
                    order_id,
                    status: crate::domain::OrderStatus::Submitted,
                    filled_quantity: 0,
                    avg_fill_price: None,
                });
            }
        }

        info!(
            "[PAPER] {} {} {} @ {} ({})",
            direction, quantity, market_id, side_price, order_id
        );
        Ok(OrderResult::filled(order_id, quantity, side_price))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        debug!(%order_id, "paper cancel");
        Ok(())
    }

    async fn sync_market_data(&self) -> Result<bool> {
        let markets: Vec<Market> = self.book.read().await.values().cloned().collect();
        if markets.is_empty() {
            warn!("Paper book is empty, nothing to sync");
            return Ok(false);
        }

        for market in &markets {
            self.repository.upsert_market(market).await?;
            self.repository
                .record_price_point(&market.id, market.yes_price, market.no_price, Some(market.volume))
                .await?;
        }

        debug!("Synced {} paper markets", markets.len());
        Ok(true)
    }
}
