use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Market, NewTrade, NewsArticle, PerformanceSnapshot, Position, PricePoint, Signal,
    SignalRecord, Trade,
};
use crate::error::Result;

/// Storage for markets, positions, trades, signals and performance history.
///
/// Implementations must serialize conflicting writes to the same position row;
/// the engine relies on `update_position` being an atomic update-or-insert.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Cheap connectivity check used before the engine starts
    async fn ping(&self) -> Result<()>;

    // ==================== Markets ====================

    async fn get_market(&self, market_id: &str) -> Result<Option<Market>>;

    /// Insert or update a market and re-mark any open position in it
    async fn upsert_market(&self, market: &Market) -> Result<()>;

    async fn record_price_point(
        &self,
        market_id: &str,
        yes_price: Decimal,
        no_price: Decimal,
        volume: Option<Decimal>,
    ) -> Result<()>;

    /// Most recent price points first
    async fn get_price_history(&self, market_id: &str, limit: u32) -> Result<Vec<PricePoint>>;

    // ==================== Positions & Trades ====================

    async fn get_active_positions(&self) -> Result<Vec<Position>>;

    /// Apply a signed fill. Returns `None` when the position nets to zero and is removed.
    async fn update_position(
        &self,
        market_id: &str,
        delta_quantity: i64,
        price: Decimal,
    ) -> Result<Option<Position>>;

    async fn record_trade(&self, trade: &NewTrade) -> Result<Trade>;

    // ==================== Signals ====================

    async fn record_trading_signal(&self, signal: &Signal) -> Result<SignalRecord>;

    async fn mark_signal_executed(&self, signal_id: Uuid) -> Result<()>;

    /// Unexecuted signals, optionally for one strategy, highest confidence first
    async fn get_pending_signals<'a>(&self, strategy: Option<&'a str>) -> Result<Vec<SignalRecord>>;

    // ==================== Performance ====================

    /// Snapshots from the last `days` days, newest first
    async fn get_performance_history(&self, days: u32) -> Result<Vec<PerformanceSnapshot>>;

    async fn record_performance_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<()>;

    // ==================== News ====================

    /// Articles published within `hours` with relevance at least `min_relevance`, newest first
    async fn get_recent_news(&self, hours: u32, min_relevance: f64) -> Result<Vec<NewsArticle>>;

    async fn record_news_article(&self, article: &NewsArticle) -> Result<()>;
}
