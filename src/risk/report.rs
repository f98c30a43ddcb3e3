//! Per-position risk and the portfolio risk report

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::engine::{classify_risk_level, PortfolioRiskEngine, RiskLimits, LIMIT_CHECK_HISTORY};
use crate::domain::{Position, RiskLevel, RiskMetrics};
use crate::error::RiskError;
use crate::strategy::calculations::{
    mean, population_std, simple_returns_newest_first, truncated_correlation, MIN_HISTORY_POINTS,
};

/// One-sided 99% z-score used for the VaR contribution
const VAR_Z_SCORE: f64 = 2.33;
const DEFAULT_VOLATILITY: f64 = 0.1;
const VAR_SCORE_CEILING: f64 = 0.05;
const HIGH_RISK_SCORE: f64 = 0.7;
const TOP_POSITIONS: usize = 5;
const OVERSIZED_POSITION: f64 = 0.12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRisk {
    pub market_id: String,
    pub current_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub position_size_fraction: f64,
    pub correlation_with_portfolio: f64,
    pub var_contribution: f64,
    /// Weighted score in [0, 1]
    pub risk_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub timestamp: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub portfolio_metrics: RiskMetrics,
    pub position_count: usize,
    pub position_risks: Vec<PositionRisk>,
    pub top_risk_positions: Vec<PositionRisk>,
    pub recommendations: Vec<String>,
    pub limits: RiskLimits,
}

impl PortfolioRiskEngine {
    /// Size, correlation and VaR contribution for one held position
    pub async fn assess_position_risk(&self, position: &Position) -> Result<PositionRisk, RiskError> {
        let bankroll = self.bankroll_f64();
        let size = position.current_value.abs().to_f64().unwrap_or(0.0) / bankroll;

        let own = self.price_series(&position.market_id, LIMIT_CHECK_HISTORY).await?;

        let mut correlations = Vec::new();
        for other in self.active_positions().await? {
            if other.market_id == position.market_id {
                continue;
            }
            let series = self.price_series(&other.market_id, LIMIT_CHECK_HISTORY).await?;
            if let Some(r) = truncated_correlation(&own, &series, MIN_HISTORY_POINTS) {
                correlations.push(r.abs());
            }
        }
        let correlation = mean(&correlations).unwrap_or(0.0);

        let var_contribution = if own.len() < MIN_HISTORY_POINTS {
            size * DEFAULT_VOLATILITY
        } else {
            let returns = simple_returns_newest_first(&own);
            let volatility = population_std(&returns).unwrap_or(DEFAULT_VOLATILITY);
            size * volatility * VAR_Z_SCORE
        };

        Ok(PositionRisk {
            market_id: position.market_id.clone(),
            current_value: position.current_value,
            unrealized_pnl: position.unrealized_pnl,
            position_size_fraction: size,
            correlation_with_portfolio: correlation,
            var_contribution,
            risk_score: self.position_risk_score(size, correlation, var_contribution),
        })
    }

    fn position_risk_score(&self, size: f64, correlation: f64, var_contribution: f64) -> f64 {
        let limits = self.limits();
        let max_single = limits.max_single_position.to_f64().unwrap_or(1.0);
        let size_risk = ratio(size, max_single);
        let correlation_risk = ratio(correlation, limits.max_correlation);
        let var_risk = ratio(var_contribution, VAR_SCORE_CEILING);
        (size_risk * 0.4 + correlation_risk * 0.3 + var_risk * 0.3).min(1.0)
    }

    /// Full report: metrics, the level they classify to, per-position risks, advice.
    ///
    /// Does not store the level; only the trading loop updates it.
    pub async fn risk_report(&self) -> Result<RiskReport, RiskError> {
        let metrics = self.calculate_portfolio_metrics().await?;
        let positions = self.active_positions().await?;

        let mut position_risks = Vec::with_capacity(positions.len());
        for position in &positions {
            position_risks.push(self.assess_position_risk(position).await?);
        }

        let risk_level = classify_risk_level(&metrics);

        let mut top_risk_positions = position_risks.clone();
        top_risk_positions.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        top_risk_positions.truncate(TOP_POSITIONS);

        Ok(RiskReport {
            timestamp: Utc::now(),
            risk_level,
            portfolio_metrics: metrics,
            position_count: positions.len(),
            recommendations: recommendations(&metrics, &position_risks),
            position_risks,
            top_risk_positions,
            limits: self.limits().clone(),
        })
    }
}

fn ratio(value: f64, ceiling: f64) -> f64 {
    if ceiling <= 0.0 {
        return 1.0;
    }
    (value / ceiling).min(1.0)
}

pub fn recommendations(metrics: &RiskMetrics, positions: &[PositionRisk]) -> Vec<String> {
    let mut out = Vec::new();

    if metrics.total_exposure > 0.7 {
        out.push("Consider reducing overall portfolio exposure".to_string());
    }
    if metrics.max_position_size > 0.15 {
        out.push("Reduce size of largest position to improve diversification".to_string());
    }
    if metrics.portfolio_correlation > 0.7 {
        out.push(
            "Portfolio shows high correlation - consider diversifying into uncorrelated markets"
                .to_string(),
        );
    }
    if metrics.var_95 > 0.05 {
        out.push("Value at Risk is elevated - consider reducing position sizes".to_string());
    }
    if metrics.sharpe_ratio < 0.5 {
        out.push("Risk-adjusted returns are low - review strategy performance".to_string());
    }

    let high_risk: Vec<&PositionRisk> = positions
        .iter()
        .filter(|p| p.risk_score > HIGH_RISK_SCORE)
        .collect();
    if !high_risk.is_empty() {
        out.push(format!("Review {} high-risk positions", high_risk.len()));
    }
    for position in high_risk.iter().take(3) {
        if position.position_size_fraction > OVERSIZED_POSITION {
            out.push(format!(
                "Consider reducing position size in {}",
                position.market_id
            ));
        }
    }

    out
}
