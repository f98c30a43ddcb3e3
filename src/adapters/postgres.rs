use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{
    FeatureBag, Market, MarketStatus, NewTrade, NewsArticle, PerformanceSnapshot, Position,
    PricePoint, Signal, SignalDirection, SignalRecord, Trade,
};
use crate::error::{AugurError, Result};
use crate::persistence::Repository;

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Create a new PostgreSQL repository
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== Row mapping ====================

fn parse_direction(raw: &str) -> Result<SignalDirection> {
    raw.parse()
        .map_err(|e: String| AugurError::Internal(format!("corrupt direction column: {e}")))
}

fn market_from_row(row: &PgRow) -> Result<Market> {
    let status: String = row.try_get("status")?;
    Ok(Market {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        subtitle: row.try_get("subtitle")?,
        category: row.try_get("category")?,
        status: MarketStatus::parse(&status),
        yes_price: row.try_get("yes_price")?,
        no_price: row.try_get("no_price")?,
        volume: row.try_get("volume")?,
        open_interest: row.try_get("open_interest")?,
        close_time: row.try_get("close_time")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn position_from_row(row: &PgRow) -> Result<Position> {
    Ok(Position {
        market_id: row.try_get("market_id")?,
        quantity: row.try_get("quantity")?,
        average_price: row.try_get("average_price")?,
        current_value: row.try_get("current_value")?,
        unrealized_pnl: row.try_get("unrealized_pnl")?,
        opened_at: row.try_get("opened_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn signal_from_row(row: &PgRow) -> Result<SignalRecord> {
    let direction: String = row.try_get("direction")?;
    let features: Json<FeatureBag> = row.try_get("features")?;
    Ok(SignalRecord {
        id: row.try_get("id")?,
        market_id: row.try_get("market_id")?,
        strategy: row.try_get("strategy")?,
        direction: parse_direction(&direction)?,
        confidence: row.try_get("confidence")?,
        rationale: row.try_get("rationale")?,
        features: features.0,
        generated_at: row.try_get("generated_at")?,
        executed: row.try_get("executed")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> Result<PerformanceSnapshot> {
    let total_trades: i64 = row.try_get("total_trades")?;
    let successful_trades: i64 = row.try_get("successful_trades")?;
    Ok(PerformanceSnapshot {
        recorded_at: row.try_get("recorded_at")?,
        total_value: row.try_get("total_value")?,
        daily_pnl: row.try_get("daily_pnl")?,
        cumulative_pnl: row.try_get("cumulative_pnl")?,
        total_trades: total_trades.max(0) as u64,
        successful_trades: successful_trades.max(0) as u64,
    })
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ==================== Markets ====================

    async fn get_market(&self, market_id: &str) -> Result<Option<Market>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, subtitle, category, status, yes_price, no_price,
                   volume, open_interest, close_time, updated_at
            FROM markets WHERE id = $1
            "#,
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(market_from_row).transpose()
    }

    #[instrument(skip(self, market), fields(market_id = %market.id))]
    async fn upsert_market(&self, market: &Market) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO markets (id, title, subtitle, category, status, yes_price, no_price,
                                 volume, open_interest, close_time, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                subtitle = EXCLUDED.subtitle,
                category = EXCLUDED.category,
                status = EXCLUDED.status,
                yes_price = EXCLUDED.yes_price,
                no_price = EXCLUDED.no_price,
                volume = EXCLUDED.volume,
                open_interest = EXCLUDED.open_interest,
                close_time = EXCLUDED.close_time,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&market.id)
        .bind(&market.title)
        .bind(&market.subtitle)
        .bind(&market.category)
        .bind(market.status.as_str())
        .bind(market.yes_price)
        .bind(market.no_price)
        .bind(market.volume)
        .bind(market.open_interest)
        .bind(market.close_time)
        .bind(market.updated_at)
        .execute(&mut *tx)
        .await?;

        // Long positions hold yes contracts, short positions hold no contracts
        sqlx::query(
            r#"
            UPDATE positions SET
                current_value = ABS(quantity) * CASE WHEN quantity > 0 THEN $2 ELSE $3 END,
                unrealized_pnl = ABS(quantity) * (CASE WHEN quantity > 0 THEN $2 ELSE $3 END - average_price),
                updated_at = NOW()
            WHERE market_id = $1
            "#,
        )
        .bind(&market.id)
        .bind(market.yes_price)
        .bind(market.no_price)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_price_point(
        &self,
        market_id: &str,
        yes_price: Decimal,
        no_price: Decimal,
        volume: Option<Decimal>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_history (market_id, yes_price, no_price, volume, recorded_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(market_id)
        .bind(yes_price)
        .bind(no_price)
        .bind(volume)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_price_history(&self, market_id: &str, limit: u32) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, yes_price, no_price, volume, recorded_at
            FROM price_history
            WHERE market_id = $1
            ORDER BY recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(market_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PricePoint {
                    market_id: row.try_get("market_id")?,
                    yes_price: row.try_get("yes_price")?,
                    no_price: row.try_get("no_price")?,
                    volume: row.try_get("volume")?,
                    timestamp: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    // ==================== Positions ====================

    async fn get_active_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, quantity, average_price, current_value, unrealized_pnl,
                   opened_at, updated_at
            FROM positions
            WHERE quantity <> 0
            ORDER BY opened_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// Row-locked read-modify-write; the row is deleted when the net quantity hits zero
    #[instrument(skip(self))]
    async fn update_position(
        &self,
        market_id: &str,
        delta_quantity: i64,
        price: Decimal,
    ) -> Result<Option<Position>> {
        let mut tx = self.pool.begin().await?;

        // Placeholder row so FOR UPDATE has something to lock on a first fill
        sqlx::query(
            r#"
            INSERT INTO positions (market_id, quantity, average_price)
            VALUES ($1, 0, $2)
            ON CONFLICT (market_id) DO NOTHING
            "#,
        )
        .bind(market_id)
        .bind(price)
        .execute(&mut *tx)
        .await?;

        let existing = sqlx::query(
            r#"
            SELECT market_id, quantity, average_price, current_value, unrealized_pnl,
                   opened_at, updated_at
            FROM positions WHERE market_id = $1
            FOR UPDATE
            "#,
        )
        .bind(market_id)
        .fetch_optional(&mut *tx)
        .await?;

        let held = existing
            .as_ref()
            .map(position_from_row)
            .transpose()?
            .filter(|p| p.quantity != 0);

        let updated = match held {
            Some(position) if delta_quantity == 0 => Some(position),
            Some(position) => position.apply_fill(delta_quantity, price),
            None if delta_quantity == 0 => None,
            None => Some(Position::open(market_id, delta_quantity, price)),
        };

        match &updated {
            Some(position) => {
                sqlx::query(
                    r#"
                    INSERT INTO positions (market_id, quantity, average_price, current_value,
                                           unrealized_pnl, opened_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (market_id) DO UPDATE SET
                        quantity = EXCLUDED.quantity,
                        average_price = EXCLUDED.average_price,
                        current_value = EXCLUDED.current_value,
                        unrealized_pnl = EXCLUDED.unrealized_pnl,
                        opened_at = EXCLUDED.opened_at,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(&position.market_id)
                .bind(position.quantity)
                .bind(position.average_price)
                .bind(position.current_value)
                .bind(position.unrealized_pnl)
                .bind(position.opened_at)
                .bind(position.updated_at)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM positions WHERE market_id = $1")
                    .bind(market_id)
                    .execute(&mut *tx)
                    .await?;
                debug!(%market_id, "position closed");
            }
        }

        tx.commit().await?;
        Ok(updated)
    }

    // ==================== Trades ====================

    #[instrument(skip(self, trade), fields(market_id = %trade.market_id))]
    async fn record_trade(&self, trade: &NewTrade) -> Result<Trade> {
        let trade = Trade::from_new(trade);

        sqlx::query(
            r#"
            INSERT INTO trades (id, market_id, strategy, direction, quantity, price,
                                total_cost, confidence, simulated, executed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(trade.id)
        .bind(&trade.market_id)
        .bind(&trade.strategy)
        .bind(trade.direction.as_str())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.total_cost)
        .bind(trade.confidence)
        .bind(trade.simulated)
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;

        Ok(trade)
    }

    // ==================== Signals ====================

    async fn record_trading_signal(&self, signal: &Signal) -> Result<SignalRecord> {
        let record = SignalRecord::from_signal(signal);

        sqlx::query(
            r#"
            INSERT INTO trading_signals (id, market_id, strategy, direction, confidence,
                                         rationale, features, generated_at, executed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(&record.market_id)
        .bind(&record.strategy)
        .bind(record.direction.as_str())
        .bind(record.confidence)
        .bind(&record.rationale)
        .bind(Json(&record.features))
        .bind(record.generated_at)
        .bind(record.executed)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_signal_executed(&self, signal_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE trading_signals SET executed = TRUE WHERE id = $1")
            .bind(signal_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AugurError::Internal(format!("unknown signal {signal_id}")));
        }
        Ok(())
    }

    async fn get_pending_signals<'a>(&self, strategy: Option<&'a str>) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, market_id, strategy, direction, confidence, rationale, features,
                   generated_at, executed
            FROM trading_signals
            WHERE executed = FALSE AND ($1::TEXT IS NULL OR strategy = $1)
            ORDER BY confidence DESC
            "#,
        )
        .bind(strategy)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(signal_from_row).collect()
    }

    // ==================== Performance ====================

    async fn get_performance_history(&self, days: u32) -> Result<Vec<PerformanceSnapshot>> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::days(i64::from(days));
        let rows = sqlx::query(
            r#"
            SELECT recorded_at, total_value, daily_pnl, cumulative_pnl,
                   total_trades, successful_trades
            FROM performance_snapshots
            WHERE recorded_at >= $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    async fn record_performance_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO performance_snapshots (recorded_at, total_value, daily_pnl,
                                               cumulative_pnl, total_trades, successful_trades)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.recorded_at)
        .bind(snapshot.total_value)
        .bind(snapshot.daily_pnl)
        .bind(snapshot.cumulative_pnl)
        .bind(i64::try_from(snapshot.total_trades).unwrap_or(i64::MAX))
        .bind(i64::try_from(snapshot.successful_trades).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== News ====================

    async fn get_recent_news(&self, hours: u32, min_relevance: f64) -> Result<Vec<NewsArticle>> {
        let cutoff: DateTime<Utc> = Utc::now() - Duration::hours(i64::from(hours));
        let rows = sqlx::query(
            r#"
            SELECT title, content, source, url, published_at, sentiment_score, relevance_score
            FROM news_articles
            WHERE published_at >= $1 AND relevance_score >= $2
            ORDER BY published_at DESC
            "#,
        )
        .bind(cutoff)
        .bind(min_relevance)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(NewsArticle {
                    title: row.try_get("title")?,
                    content: row.try_get("content")?,
                    source: row.try_get("source")?,
                    url: row.try_get("url")?,
                    published_at: row.try_get("published_at")?,
                    sentiment_score: row.try_get("sentiment_score")?,
                    relevance_score: row.try_get("relevance_score")?,
                })
            })
            .collect()
    }

    async fn record_news_article(&self, article: &NewsArticle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO news_articles (title, content, source, url, published_at,
                                       sentiment_score, relevance_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&article.title)
        .bind(&article.content)
        .bind(&article.source)
        .bind(&article.url)
        .bind(article.published_at)
        .bind(article.sentiment_score)
        .bind(article.relevance_score)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
