use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Portfolio value at the end of a cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub recorded_at: DateTime<Utc>,
    pub total_value: Decimal,
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub total_trades: u64,
    pub successful_trades: u64,
}

impl PerformanceSnapshot {
    pub fn date(&self) -> NaiveDate {
        self.recorded_at.date_naive()
    }
}

/// Collapse a snapshot series to the latest snapshot per UTC date, oldest first.
pub fn daily_series(history: &[PerformanceSnapshot]) -> Vec<PerformanceSnapshot> {
    let mut sorted: Vec<&PerformanceSnapshot> = history.iter().collect();
    sorted.sort_by_key(|s| s.recorded_at);

    let mut daily: Vec<PerformanceSnapshot> = Vec::new();
    for snapshot in sorted {
        match daily.last_mut() {
            Some(last) if last.date() == snapshot.date() => *last = snapshot.clone(),
            _ => daily.push(snapshot.clone()),
        }
    }
    daily
}

/// Rolling performance summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_pnl: Decimal,
    pub total_return_pct: f64,
    pub daily_avg_pnl: f64,
    pub daily_pnl_std: f64,
    pub best_day: f64,
    pub worst_day: f64,
    pub trading_days: usize,
    pub positive_days: usize,
    pub win_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn snap(day: u32, hour: u32, value: Decimal) -> PerformanceSnapshot {
        PerformanceSnapshot {
            recorded_at: Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap(),
            total_value: value,
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            total_trades: 0,
            successful_trades: 0,
        }
    }

    #[test]
    fn test_daily_series_keeps_latest_per_day() {
        let history = vec![
            snap(2, 9, dec!(10100)),
            snap(1, 9, dec!(10000)),
            snap(1, 18, dec!(10050)),
        ];

        let daily = daily_series(&history);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].total_value, dec!(10050));
        assert_eq!(daily[1].total_value, dec!(10100));
    }
}
