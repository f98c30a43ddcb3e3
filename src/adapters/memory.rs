//! In-memory repository
//!
//! Positions live in a `DashMap` keyed by market, so an update-or-insert holds
//! the shard lock for the whole read-modify-write. Append-only series sit behind
//! `RwLock`s and are trimmed on write: price series to the newest
//! `max_price_points` per market, snapshots to the retention window.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Market, NewTrade, NewsArticle, PerformanceSnapshot, Position, PricePoint, Signal,
    SignalRecord, Trade,
};
use crate::error::{AugurError, Result};
use crate::persistence::Repository;

/// Newest points kept per market; strategies and the risk engine read at most 100
pub const DEFAULT_MAX_PRICE_POINTS: usize = 1_000;
/// Snapshot age kept; summaries and VaR look back 30 days
pub const DEFAULT_SNAPSHOT_RETENTION_DAYS: i64 = 90;

pub struct InMemoryRepository {
    markets: DashMap<String, Market>,
    positions: DashMap<String, Position>,
    /// Oldest first per market
    prices: DashMap<String, Vec<PricePoint>>,
    trades: RwLock<Vec<Trade>>,
    signals: RwLock<Vec<SignalRecord>>,
    performance: RwLock<Vec<PerformanceSnapshot>>,
    news: RwLock<Vec<NewsArticle>>,
    max_price_points: usize,
    snapshot_retention: Duration,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::with_retention(
            DEFAULT_MAX_PRICE_POINTS,
            Duration::days(DEFAULT_SNAPSHOT_RETENTION_DAYS),
        )
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(max_price_points: usize, snapshot_retention: Duration) -> Self {
        Self {
            markets: DashMap::new(),
            positions: DashMap::new(),
            prices: DashMap::new(),
            trades: RwLock::new(Vec::new()),
            signals: RwLock::new(Vec::new()),
            performance: RwLock::new(Vec::new()),
            news: RwLock::new(Vec::new()),
            max_price_points: max_price_points.max(1),
            snapshot_retention,
        }
    }

    /// Append a price point with an explicit timestamp (backfills, tests)
    pub fn push_price_point(&self, point: PricePoint) {
        let mut series = self.prices.entry(point.market_id.clone()).or_default();
        series.push(point);
        series.sort_by_key(|p| p.timestamp);
        trim_front(&mut *series, self.max_price_points);
    }

    pub async fn trades(&self) -> Vec<Trade> {
        self.trades.read().await.clone()
    }

    pub async fn signals(&self) -> Vec<SignalRecord> {
        self.signals.read().await.clone()
    }

    pub async fn snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.performance.read().await.clone()
    }

    pub fn position(&self, market_id: &str) -> Option<Position> {
        self.positions.get(market_id).map(|p| p.clone())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_market(&self, market_id: &str) -> Result<Option<Market>> {
        Ok(self.markets.get(market_id).map(|m| m.clone()))
    }

    async fn upsert_market(&self, market: &Market) -> Result<()> {
        self.markets.insert(market.id.clone(), market.clone());

        if let Some(mut position) = self.positions.get_mut(&market.id) {
            let price = if position.is_long() {
                market.yes_price
            } else {
                market.no_price
            };
            position.mark(price);
        }
        Ok(())
    }

    async fn record_price_point(
        &self,
        market_id: &str,
        yes_price: Decimal,
        no_price: Decimal,
        volume: Option<Decimal>,
    ) -> Result<()> {
        let mut series = self.prices.entry(market_id.to_string()).or_default();
        series.push(PricePoint {
            market_id: market_id.to_string(),
            yes_price,
            no_price,
            volume,
            timestamp: Utc::now(),
        });
        trim_front(&mut *series, self.max_price_points);
        Ok(())
    }

    async fn get_price_history(&self, market_id: &str, limit: u32) -> Result<Vec<PricePoint>> {
        Ok(self
            .prices
            .get(market_id)
            .map(|series| series.iter().rev().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_active_positions(&self) -> Result<Vec<Position>> {
        let mut positions: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.quantity != 0)
            .map(|p| p.clone())
            .collect();
        positions.sort_by_key(|p| p.opened_at);
        Ok(positions)
    }

    async fn update_position(
        &self,
        market_id: &str,
        delta_quantity: i64,
        price: Decimal,
    ) -> Result<Option<Position>> {
        if delta_quantity == 0 {
            return Ok(self.position(market_id));
        }

        match self.positions.entry(market_id.to_string()) {
            Entry::Occupied(mut entry) => match entry.get().clone().apply_fill(delta_quantity, price) {
                Some(updated) => {
                    entry.insert(updated.clone());
                    Ok(Some(updated))
                }
                None => {
                    entry.remove();
                    debug!(%market_id, "position closed");
                    Ok(None)
                }
            },
            Entry::Vacant(entry) => {
                let position = Position::open(market_id, delta_quantity, price);
                entry.insert(position.clone());
                Ok(Some(position))
            }
        }
    }

    async fn record_trade(&self, trade: &NewTrade) -> Result<Trade> {
        let trade = Trade::from_new(trade);
        self.trades.write().await.push(trade.clone());
        Ok(trade)
    }

    async fn record_trading_signal(&self, signal: &Signal) -> Result<SignalRecord> {
        let record = SignalRecord::from_signal(signal);
        self.signals.write().await.push(record.clone());
        Ok(record)
    }

    async fn mark_signal_executed(&self, signal_id: Uuid) -> Result<()> {
        let mut signals = self.signals.write().await;
        let record = signals
            .iter_mut()
            .find(|s| s.id == signal_id)
            .ok_or_else(|| AugurError::Internal(format!("unknown signal {signal_id}")))?;
        record.executed = true;
        Ok(())
    }

    async fn get_pending_signals<'a>(&self, strategy: Option<&'a str>) -> Result<Vec<SignalRecord>> {
        let mut pending: Vec<SignalRecord> = self
            .signals
            .read()
            .await
            .iter()
            .filter(|s| !s.executed)
            .filter(|s| strategy.map_or(true, |name| s.strategy == name))
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(pending)
    }

    async fn get_performance_history(&self, days: u32) -> Result<Vec<PerformanceSnapshot>> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let mut history: Vec<PerformanceSnapshot> = self
            .performance
            .read()
            .await
            .iter()
            .filter(|s| s.recorded_at >= cutoff)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(history)
    }

    async fn record_performance_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        let cutoff = Utc::now() - self.snapshot_retention;
        let mut history = self.performance.write().await;
        history.retain(|s| s.recorded_at >= cutoff);
        history.push(snapshot.clone());
        Ok(())
    }

    async fn get_recent_news(&self, hours: u32, min_relevance: f64) -> Result<Vec<NewsArticle>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(hours));
        let mut articles: Vec<NewsArticle> = self
            .news
            .read()
            .await
            .iter()
            .filter(|a| a.published_at >= cutoff)
            .filter(|a| a.relevance_score.map_or(false, |r| r >= min_relevance))
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(articles)
    }

    async fn record_news_article(&self, article: &NewsArticle) -> Result<()> {
        self.news.write().await.push(article.clone());
        Ok(())
    }
}

/// Drop the oldest entries beyond `cap`
fn trim_front<T>(series: &mut Vec<T>, cap: usize) {
    if series.len() > cap {
        let excess = series.len() - cap;
        series.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalDirection;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_zero_quantity_removes_position() {
        let repo = InMemoryRepository::new();

        let opened = repo.update_position("M1", 100, dec!(0.40)).await.unwrap();
        assert_eq!(opened.map(|p| p.quantity), Some(100));

        let closed = repo.update_position("M1", -100, dec!(0.60)).await.unwrap();
        assert!(closed.is_none());
        assert!(repo.get_active_positions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_market_remarks_position() {
        let repo = InMemoryRepository::new();
        repo.update_position("M1", 100, dec!(0.40)).await.unwrap();

        let market = Market {
            id: "M1".to_string(),
            title: "Test".to_string(),
            subtitle: None,
            category: None,
            status: crate::domain::MarketStatus::Active,
            yes_price: dec!(0.50),
            no_price: dec!(0.50),
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            close_time: None,
            updated_at: Utc::now(),
        };
        repo.upsert_market(&market).await.unwrap();

        let position = repo.position("M1").unwrap();
        assert_eq!(position.current_value, dec!(50));
        assert_eq!(position.unrealized_pnl, dec!(10));
    }

    #[tokio::test]
    async fn test_signal_lifecycle() {
        let repo = InMemoryRepository::new();
        let mut signal = Signal::new("M1", SignalDirection::Buy, 0.8, dec!(0.05));
        signal.strategy = "sentiment".to_string();

        let record = repo.record_trading_signal(&signal).await.unwrap();
        assert_eq!(repo.get_pending_signals(Some("sentiment")).await.unwrap().len(), 1);
        assert!(repo.get_pending_signals(Some("other")).await.unwrap().is_empty());

        repo.mark_signal_executed(record.id).await.unwrap();
        assert!(repo.get_pending_signals(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_price_history_newest_first() {
        let repo = InMemoryRepository::new();
        for i in 1..=3 {
            repo.record_price_point("M1", Decimal::new(i, 1), dec!(0.5), None)
                .await
                .unwrap();
        }

        let history = repo.get_price_history("M1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].yes_price, dec!(0.3));
        assert_eq!(history[1].yes_price, dec!(0.2));
    }

    #[tokio::test]
    async fn test_price_series_keeps_newest_points() {
        let repo = InMemoryRepository::with_retention(3, Duration::days(1));
        for cents in 40..46 {
            repo.record_price_point("A", Decimal::new(cents, 2), Decimal::new(100 - cents, 2), None)
                .await
                .expect("price");
        }

        let history = repo.get_price_history("A", 10).await.expect("history");
        let yes: Vec<Decimal> = history.iter().map(|p| p.yes_price).collect();
        assert_eq!(yes, vec![dec!(0.45), dec!(0.44), dec!(0.43)]);
    }

    #[tokio::test]
    async fn test_snapshots_older_than_retention_are_dropped() {
        let repo = InMemoryRepository::with_retention(10, Duration::days(7));
        let snapshot = |age_days: i64| PerformanceSnapshot {
            recorded_at: Utc::now() - Duration::days(age_days),
            total_value: dec!(10000),
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            total_trades: 0,
            successful_trades: 0,
        };
        repo.record_performance_snapshot(&snapshot(30)).await.expect("old");
        repo.record_performance_snapshot(&snapshot(2)).await.expect("recent");
        repo.record_performance_snapshot(&snapshot(0)).await.expect("today");

        assert_eq!(repo.snapshots().await.len(), 2);
    }
}
