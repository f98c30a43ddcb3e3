//! Daily performance bookkeeping
//!
//! Counts trades for the current UTC day and writes one
//! [`PerformanceSnapshot`] per cycle. The risk engine reads these snapshots
//! back as its P&L series.

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{daily_series, PerformanceSnapshot, PerformanceSummary};
use crate::error::Result;
use crate::persistence::Repository;

/// Days of history searched for the previous day's close
const SNAPSHOT_LOOKBACK_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy)]
struct DailyCounters {
    date: NaiveDate,
    trades: u64,
    successful: u64,
    daily_pnl: Decimal,
}

impl DailyCounters {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            trades: 0,
            successful: 0,
            daily_pnl: Decimal::ZERO,
        }
    }

    /// Reset counts when the UTC date moves on; P&L is left for the next snapshot
    fn roll(&mut self, today: NaiveDate) {
        if self.date != today {
            debug!("Daily counters rolled over {} -> {}", self.date, today);
            self.date = today;
            self.trades = 0;
            self.successful = 0;
        }
    }
}

pub struct PerformanceTracker {
    repository: Arc<dyn Repository>,
    bankroll: Decimal,
    counters: Mutex<DailyCounters>,
}

impl PerformanceTracker {
    pub fn new(repository: Arc<dyn Repository>, bankroll: Decimal) -> Self {
        Self {
            repository,
            bankroll,
            counters: Mutex::new(DailyCounters::new(Utc::now().date_naive())),
        }
    }

    /// Add one cycle's execution attempts and committed trades
    pub async fn record_cycle(&self, attempted: u64, committed: u64) {
        let mut counters = self.counters.lock().await;
        counters.roll(Utc::now().date_naive());
        counters.trades += attempted;
        counters.successful += committed;
    }

    /// (trades today, successful trades today)
    pub async fn trades_today(&self) -> (u64, u64) {
        let mut counters = self.counters.lock().await;
        counters.roll(Utc::now().date_naive());
        (counters.trades, counters.successful)
    }

    pub async fn daily_pnl(&self) -> Decimal {
        self.counters.lock().await.daily_pnl
    }

    /// Value the portfolio and persist a snapshot
    pub async fn snapshot(&self) -> Result<PerformanceSnapshot> {
        let now = Utc::now();
        let today = now.date_naive();

        let positions = self.repository.get_active_positions().await?;
        let unrealized: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
        let total_value = self.bankroll + unrealized;

        // History is newest first
        let history = self
            .repository
            .get_performance_history(SNAPSHOT_LOOKBACK_DAYS)
            .await?;
        let previous_close = history
            .iter()
            .find(|s| s.date() < today)
            .map(|s| s.total_value)
            .unwrap_or(self.bankroll);

        let mut counters = self.counters.lock().await;
        counters.roll(today);
        counters.daily_pnl = total_value - previous_close;

        let snapshot = PerformanceSnapshot {
            recorded_at: now,
            total_value,
            daily_pnl: counters.daily_pnl,
            cumulative_pnl: total_value - self.bankroll,
            total_trades: counters.trades,
            successful_trades: counters.successful,
        };
        drop(counters);

        self.repository.record_performance_snapshot(&snapshot).await?;
        debug!(
            total_value = %snapshot.total_value,
            daily_pnl = %snapshot.daily_pnl,
            "Performance snapshot recorded"
        );
        Ok(snapshot)
    }

    /// Summary over the last `days` days, one point per UTC date
    pub async fn summary(&self, days: u32) -> Result<PerformanceSummary> {
        let history = self.repository.get_performance_history(days).await?;
        Ok(summarize(&daily_series(&history), self.bankroll))
    }
}

/// Summarise a daily series (oldest first)
pub fn summarize(daily: &[PerformanceSnapshot], bankroll: Decimal) -> PerformanceSummary {
    let Some(latest) = daily.last() else {
        return PerformanceSummary::default();
    };

    let pnls: Vec<f64> = daily
        .iter()
        .map(|s| s.daily_pnl.to_f64().unwrap_or(0.0))
        .collect();
    let n = pnls.len() as f64;
    let mean = pnls.iter().sum::<f64>() / n;
    let std = if pnls.len() > 1 {
        (pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n).sqrt()
    } else {
        0.0
    };
    let positive_days = pnls.iter().filter(|p| **p > 0.0).count();

    let total_return_pct = if bankroll > Decimal::ZERO {
        (latest.cumulative_pnl / bankroll * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };

    PerformanceSummary {
        total_pnl: latest.cumulative_pnl,
        total_return_pct,
        daily_avg_pnl: mean,
        daily_pnl_std: std,
        best_day: pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        worst_day: pnls.iter().copied().fold(f64::INFINITY, f64::min),
        trading_days: pnls.len(),
        positive_days,
        win_rate: positive_days as f64 / n,
    }
}
