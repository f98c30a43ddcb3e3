use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{RiskConfig, TradingConfig};
use crate::domain::{daily_series, Position, RiskLevel, RiskMetrics};
use crate::error::{RiskError, Result};
use crate::persistence::Repository;
use crate::strategy::calculations::{
    mean, percentile, population_std, truncated_correlation, MIN_HISTORY_POINTS,
};

/// Price points per market used by the per-trade correlation check
pub const LIMIT_CHECK_HISTORY: u32 = 30;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const VAR_PERCENTILE: f64 = 5.0;
const VOLATILITY_MIN_POINTS: usize = 5;

// ==================== Level thresholds ====================

const EXPOSURE_HIGH: f64 = 0.7;
const EXPOSURE_MEDIUM: f64 = 0.5;
const CONCENTRATION_HIGH: f64 = 0.15;
const CONCENTRATION_MEDIUM: f64 = 0.10;
const CORRELATION_HIGH: f64 = 0.8;
const CORRELATION_MEDIUM: f64 = 0.6;
const VAR_HIGH: f64 = 0.05;
const VAR_MEDIUM: f64 = 0.03;

/// Limits the engine enforces, resolved from configuration
#[derive(Debug, Clone, Serialize)]
pub struct RiskLimits {
    pub bankroll: Decimal,
    pub max_single_position: Decimal,
    pub max_portfolio_exposure: Decimal,
    pub correlation_threshold: f64,
    pub correlated_position_limit: usize,
    pub max_correlation: f64,
    pub lookback_days: u32,
    pub price_history_window: u32,
}

impl RiskLimits {
    pub fn from_config(trading: &TradingConfig, risk: &RiskConfig) -> Self {
        Self {
            bankroll: trading.bankroll,
            max_single_position: trading.max_position_fraction,
            max_portfolio_exposure: risk.max_portfolio_exposure,
            correlation_threshold: risk.correlation_threshold,
            correlated_position_limit: risk.correlated_position_limit,
            max_correlation: risk.max_correlation,
            lookback_days: risk.lookback_days,
            price_history_window: risk.price_history_window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    PositionSizeLimit,
    PortfolioExposureLimit,
    CorrelationLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitViolation {
    pub kind: ViolationKind,
    pub current: f64,
    pub limit: f64,
    pub severity: RiskLevel,
}

/// Outcome of a per-trade limit check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionLimitCheck {
    pub allowed: bool,
    pub violations: Vec<LimitViolation>,
    pub proposed_size: Decimal,
    /// Never above `proposed_size`
    pub recommended_size: Decimal,
}

impl PositionLimitCheck {
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{:?} {:.3} > {:.3}", v.kind, v.current, v.limit))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Portfolio risk engine.
///
/// Computes metrics from the repository, answers per-trade limit checks, and
/// owns the process-wide [`RiskLevel`].
pub struct PortfolioRiskEngine {
    repository: Arc<dyn Repository>,
    limits: RiskLimits,
    call_timeout: Duration,
    level: RwLock<RiskLevel>,
    last_metrics: RwLock<Option<RiskMetrics>>,
    last_assessment: RwLock<Option<DateTime<Utc>>>,
}

impl PortfolioRiskEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        limits: RiskLimits,
        call_timeout: Duration,
    ) -> std::result::Result<Self, RiskError> {
        if limits.bankroll <= Decimal::ZERO {
            return Err(RiskError::InvalidBankroll(limits.bankroll));
        }
        Ok(Self {
            repository,
            limits,
            call_timeout,
            level: RwLock::new(RiskLevel::Low),
            last_metrics: RwLock::new(None),
            last_assessment: RwLock::new(None),
        })
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub(crate) fn bankroll_f64(&self) -> f64 {
        self.limits.bankroll.to_f64().unwrap_or(0.0)
    }

    pub(crate) async fn call<T, F>(&self, operation: &str, fut: F) -> std::result::Result<T, RiskError>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RiskError::Repository(format!("{operation}: {e}"))),
            Err(_) => Err(RiskError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }

    pub(crate) async fn active_positions(&self) -> std::result::Result<Vec<Position>, RiskError> {
        self.call("get_active_positions", self.repository.get_active_positions())
            .await
    }

    /// Yes-price series, newest first
    pub(crate) async fn price_series(
        &self,
        market_id: &str,
        limit: u32,
    ) -> std::result::Result<Vec<f64>, RiskError> {
        let history = self
            .call("get_price_history", self.repository.get_price_history(market_id, limit))
            .await?;
        Ok(history
            .iter()
            .filter_map(|p| p.yes_price.to_f64())
            .collect())
    }

    // ==================== Metrics ====================

    pub async fn calculate_portfolio_metrics(&self) -> std::result::Result<RiskMetrics, RiskError> {
        let positions = self.active_positions().await?;
        if positions.is_empty() {
            return Ok(RiskMetrics::default());
        }

        let bankroll = self.bankroll_f64();
        let values: Vec<f64> = positions
            .iter()
            .map(|p| p.current_value.abs().to_f64().unwrap_or(0.0))
            .collect();
        let total_exposure = values.iter().sum::<f64>() / bankroll;
        let max_position_size = values.iter().cloned().fold(0.0, f64::max) / bankroll;

        let portfolio_correlation = self.portfolio_correlation(&positions).await?;

        let pnl = self.daily_pnl_history().await?;
        let returns: Vec<f64> = pnl.iter().map(|v| v / bankroll).collect();
        let (var_95, expected_shortfall) = tail_risk(&pnl);

        let metrics = RiskMetrics {
            total_exposure,
            max_position_size,
            portfolio_correlation,
            var_95: var_95 / bankroll,
            expected_shortfall: expected_shortfall / bankroll,
            sharpe_ratio: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(&pnl, bankroll),
            daily_pnl_volatility: daily_volatility(&returns),
        };
        debug!(?metrics, "portfolio metrics");
        Ok(metrics)
    }

    /// Mean pairwise |correlation| across held positions; short pairs are skipped
    async fn portfolio_correlation(&self, positions: &[Position]) -> std::result::Result<f64, RiskError> {
        if positions.len() < 2 {
            return Ok(0.0);
        }

        let mut series = Vec::with_capacity(positions.len());
        for position in positions {
            series.push(
                self.price_series(&position.market_id, self.limits.price_history_window)
                    .await?,
            );
        }

        let mut correlations = Vec::new();
        for (i, a) in series.iter().enumerate() {
            for b in &series[i + 1..] {
                if let Some(r) = truncated_correlation(a, b, MIN_HISTORY_POINTS) {
                    correlations.push(r.abs());
                }
            }
        }
        Ok(mean(&correlations).unwrap_or(0.0))
    }

    /// Daily P&L over the lookback window, one point per UTC date, oldest first
    pub(crate) async fn daily_pnl_history(&self) -> std::result::Result<Vec<f64>, RiskError> {
        let history = self
            .call(
                "get_performance_history",
                self.repository.get_performance_history(self.limits.lookback_days),
            )
            .await?;
        Ok(daily_series(&history)
            .iter()
            .filter_map(|s| s.daily_pnl.to_f64())
            .collect())
    }

    // ==================== Per-trade limits ====================

    /// Evaluate a proposed notional for `market_id` against the configured limits
    pub async fn check_position_limits(
        &self,
        market_id: &str,
        proposed_size: Decimal,
    ) -> std::result::Result<PositionLimitCheck, RiskError> {
        let proposed = proposed_size.abs();
        let bankroll = self.limits.bankroll;
        let positions = self.active_positions().await?;

        let current_size = positions
            .iter()
            .filter(|p| p.market_id == market_id)
            .map(|p| p.current_value.abs())
            .sum::<Decimal>();
        let current_total = positions.iter().map(|p| p.current_value.abs()).sum::<Decimal>();

        let mut violations = Vec::new();

        let new_fraction = (current_size + proposed) / bankroll;
        if new_fraction > self.limits.max_single_position {
            violations.push(LimitViolation {
                kind: ViolationKind::PositionSizeLimit,
                current: new_fraction.to_f64().unwrap_or(f64::MAX),
                limit: self.limits.max_single_position.to_f64().unwrap_or(0.0),
                severity: RiskLevel::High,
            });
        }

        let exposure_fraction = (current_total + proposed) / bankroll;
        if exposure_fraction > self.limits.max_portfolio_exposure {
            violations.push(LimitViolation {
                kind: ViolationKind::PortfolioExposureLimit,
                current: exposure_fraction.to_f64().unwrap_or(f64::MAX),
                limit: self.limits.max_portfolio_exposure.to_f64().unwrap_or(0.0),
                severity: RiskLevel::High,
            });
        }

        let others: Vec<&Position> = positions.iter().filter(|p| p.market_id != market_id).collect();
        if !others.is_empty() {
            let target = self.price_series(market_id, LIMIT_CHECK_HISTORY).await?;
            let mut correlated = 0usize;
            for other in others {
                let series = self.price_series(&other.market_id, LIMIT_CHECK_HISTORY).await?;
                let linked = truncated_correlation(&target, &series, MIN_HISTORY_POINTS)
                    .map_or(false, |r| r.abs() > self.limits.correlation_threshold);
                if linked {
                    correlated += 1;
                }
            }
            if correlated >= self.limits.correlated_position_limit {
                violations.push(LimitViolation {
                    kind: ViolationKind::CorrelationLimit,
                    current: correlated as f64,
                    limit: self.limits.correlated_position_limit as f64,
                    severity: RiskLevel::Medium,
                });
            }
        }

        let recommended_size = recommended_size(
            proposed,
            &violations,
            self.limits.max_single_position * bankroll - current_size,
            self.limits.max_portfolio_exposure * bankroll - current_total,
        );

        let check = PositionLimitCheck {
            allowed: violations.is_empty(),
            violations,
            proposed_size: proposed,
            recommended_size,
        };
        if !check.allowed {
            debug!(
                %market_id,
                %proposed,
                recommended = %check.recommended_size,
                violations = %check.summary(),
                "position limits violated"
            );
        }
        Ok(check)
    }

    // ==================== Risk level ====================

    /// Recompute metrics and the risk level. Computation failures yield UNKNOWN.
    pub async fn update_risk_level(&self) -> RiskLevel {
        let (level, metrics) = match self.calculate_portfolio_metrics().await {
            Ok(metrics) => (classify_risk_level(&metrics), Some(metrics)),
            Err(e) => {
                error!("Risk metrics unavailable, risk level UNKNOWN: {}", e);
                (RiskLevel::Unknown, None)
            }
        };

        let previous = {
            let mut current = self.level.write().await;
            std::mem::replace(&mut *current, level)
        };
        *self.last_metrics.write().await = metrics;
        *self.last_assessment.write().await = Some(Utc::now());

        if previous != level {
            match level {
                RiskLevel::Critical | RiskLevel::High => {
                    warn!("Risk level changed {} -> {}", previous, level)
                }
                _ => info!("Risk level changed {} -> {}", previous, level),
            }
        }
        level
    }

    pub async fn current_risk_level(&self) -> RiskLevel {
        *self.level.read().await
    }

    pub async fn last_metrics(&self) -> Option<RiskMetrics> {
        *self.last_metrics.read().await
    }

    pub async fn last_assessment(&self) -> Option<DateTime<Utc>> {
        *self.last_assessment.read().await
    }
}

// ==================== Pure helpers ====================

/// Shrink a proposed size for each violation, floored at zero.
///
/// Without violations the proposal passes through unchanged.
pub fn recommended_size(
    proposed: Decimal,
    violations: &[LimitViolation],
    single_headroom: Decimal,
    exposure_headroom: Decimal,
) -> Decimal {
    if violations.is_empty() {
        return proposed;
    }

    let mut size = proposed;
    for violation in violations {
        size = match violation.kind {
            ViolationKind::PositionSizeLimit => size.min(single_headroom),
            ViolationKind::PortfolioExposureLimit => size.min(exposure_headroom),
            ViolationKind::CorrelationLimit => size * Decimal::new(5, 1),
        };
    }
    size.max(Decimal::ZERO)
}

/// Bucket each metric and combine into a level
pub fn classify_risk_level(metrics: &RiskMetrics) -> RiskLevel {
    let buckets = [
        bucket(metrics.total_exposure, EXPOSURE_HIGH, EXPOSURE_MEDIUM),
        bucket(metrics.max_position_size, CONCENTRATION_HIGH, CONCENTRATION_MEDIUM),
        bucket(metrics.portfolio_correlation, CORRELATION_HIGH, CORRELATION_MEDIUM),
        bucket(metrics.var_95, VAR_HIGH, VAR_MEDIUM),
    ];
    let high = buckets.iter().filter(|b| **b == Some(RiskLevel::High)).count();
    let medium = buckets.iter().filter(|b| **b == Some(RiskLevel::Medium)).count();

    match (high, medium) {
        (h, _) if h >= 2 => RiskLevel::Critical,
        (1, _) => RiskLevel::High,
        (_, m) if m >= 2 => RiskLevel::High,
        (_, 1) => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

fn bucket(value: f64, high: f64, medium: f64) -> Option<RiskLevel> {
    if value > high {
        Some(RiskLevel::High)
    } else if value > medium {
        Some(RiskLevel::Medium)
    } else {
        None
    }
}

/// Historical VaR95 and expected shortfall as absolute magnitudes
pub fn tail_risk(pnl: &[f64]) -> (f64, f64) {
    if pnl.len() < MIN_HISTORY_POINTS {
        return (0.0, 0.0);
    }
    let Some(var) = percentile(pnl, VAR_PERCENTILE) else {
        return (0.0, 0.0);
    };
    let tail: Vec<f64> = pnl.iter().copied().filter(|v| *v <= var).collect();
    let shortfall = mean(&tail).unwrap_or(0.0);
    (var.abs(), shortfall.abs())
}

/// Annualized Sharpe of daily returns, zero-rate
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < MIN_HISTORY_POINTS {
        return 0.0;
    }
    match (mean(returns), population_std(returns)) {
        (Some(m), Some(s)) if s > 0.0 => m / s * TRADING_DAYS_PER_YEAR.sqrt(),
        _ => 0.0,
    }
}

/// Largest peak-to-trough drop of the running P&L sum, as a fraction of bankroll
pub fn max_drawdown(daily_pnl: &[f64], bankroll: f64) -> f64 {
    let mut running = 0.0;
    let mut peak: Option<f64> = None;
    let mut worst: f64 = 0.0;
    for pnl in daily_pnl {
        running += pnl;
        let top = peak.map_or(running, |p: f64| p.max(running));
        peak = Some(top);
        worst = worst.max((top - running) / bankroll);
    }
    worst
}

pub fn daily_volatility(returns: &[f64]) -> f64 {
    if returns.len() < VOLATILITY_MIN_POINTS {
        return 0.0;
    }
    population_std(returns).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::domain::{PerformanceSnapshot, PricePoint};
    use crate::persistence::MockRepository;
    use approx::assert_relative_eq;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    fn limits() -> RiskLimits {
        RiskLimits::from_config(&TradingConfig::default(), &RiskConfig::default())
    }

    fn engine(repo: Arc<dyn Repository>) -> PortfolioRiskEngine {
        PortfolioRiskEngine::new(repo, limits(), Duration::from_secs(5)).expect("engine")
    }

    /// Push `n` points of a yes-price series, oldest first, one minute apart
    fn push_series(repo: &InMemoryRepository, market_id: &str, prices: &[f64]) {
        let start = Utc::now() - ChronoDuration::minutes(prices.len() as i64);
        for (i, price) in prices.iter().enumerate() {
            let yes = Decimal::try_from(*price).expect("decimal");
            repo.push_price_point(PricePoint {
                market_id: market_id.to_string(),
                yes_price: yes,
                no_price: Decimal::ONE - yes,
                volume: None,
                timestamp: start + ChronoDuration::minutes(i as i64),
            });
        }
    }

    fn trending(n: usize, slope: f64) -> Vec<f64> {
        (0..n).map(|i| 0.3 + slope * i as f64).collect()
    }

    #[test]
    fn test_classify_thresholds() {
        let mut m = RiskMetrics::default();
        assert_eq!(classify_risk_level(&m), RiskLevel::Low);

        m.total_exposure = 0.4;
        assert_eq!(classify_risk_level(&m), RiskLevel::Low);

        m.total_exposure = 0.75;
        assert_eq!(classify_risk_level(&m), RiskLevel::High);

        m.total_exposure = 0.6;
        assert_eq!(classify_risk_level(&m), RiskLevel::Medium);

        m.max_position_size = 0.12;
        assert_eq!(classify_risk_level(&m), RiskLevel::High);

        m.total_exposure = 0.75;
        m.max_position_size = 0.2;
        assert_eq!(classify_risk_level(&m), RiskLevel::Critical);
    }

    #[test]
    fn test_recommended_size_never_exceeds_proposed() {
        let size_violation = LimitViolation {
            kind: ViolationKind::PositionSizeLimit,
            current: 0.12,
            limit: 0.10,
            severity: RiskLevel::High,
        };
        let corr_violation = LimitViolation {
            kind: ViolationKind::CorrelationLimit,
            current: 3.0,
            limit: 3.0,
            severity: RiskLevel::Medium,
        };

        assert_eq!(recommended_size(dec!(500), &[], dec!(-10), dec!(0)), dec!(500));
        assert_eq!(
            recommended_size(dec!(500), &[size_violation.clone()], dec!(300), dec!(8000)),
            dec!(300)
        );
        assert_eq!(
            recommended_size(dec!(500), &[size_violation.clone(), corr_violation], dec!(300), dec!(8000)),
            dec!(150)
        );
        assert_eq!(
            recommended_size(dec!(500), &[size_violation], dec!(-200), dec!(8000)),
            Decimal::ZERO
        );
        // Headroom larger than the proposal never grows it
        let exposure = LimitViolation {
            kind: ViolationKind::PortfolioExposureLimit,
            current: 0.9,
            limit: 0.8,
            severity: RiskLevel::High,
        };
        assert_eq!(recommended_size(dec!(500), &[exposure], dec!(900), dec!(900)), dec!(500));
    }

    #[test]
    fn test_tail_risk_and_sharpe() {
        let pnl: Vec<f64> = (1..=10).map(|i| f64::from(i) * 100.0 - 550.0).collect();
        // -450..450 step 100; p5 = -450 + 0.45 * 100
        let (var, es) = tail_risk(&pnl);
        assert_relative_eq!(var, 405.0, epsilon = 1e-9);
        assert_relative_eq!(es, 450.0, epsilon = 1e-9);

        assert_eq!(tail_risk(&pnl[..9]), (0.0, 0.0));
        assert_eq!(sharpe_ratio(&[0.01; 12]), 0.0);

        let returns: Vec<f64> = pnl.iter().map(|p| p / 10_000.0).collect();
        assert_relative_eq!(sharpe_ratio(&returns), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_max_drawdown() {
        let pnl = [100.0, 200.0, -500.0, 100.0, 300.0];
        // running: 100, 300, -200, -100, 200 -> peak 300, trough -200
        assert_relative_eq!(max_drawdown(&pnl, 10_000.0), 0.05, epsilon = 1e-12);
        assert_eq!(max_drawdown(&[], 10_000.0), 0.0);
    }

    #[tokio::test]
    async fn test_metrics_zero_without_positions() {
        let repo = Arc::new(InMemoryRepository::new());
        let metrics = engine(repo).calculate_portfolio_metrics().await.expect("metrics");
        assert_eq!(metrics, RiskMetrics::default());
    }

    #[tokio::test]
    async fn test_metrics_exposure_and_correlation() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.update_position("A", 1000, dec!(0.40)).await.expect("A");
        repo.update_position("B", 500, dec!(0.40)).await.expect("B");
        push_series(&repo, "A", &trending(20, 0.01));
        push_series(&repo, "B", &trending(20, 0.02));

        let metrics = engine(repo).calculate_portfolio_metrics().await.expect("metrics");
        assert_relative_eq!(metrics.total_exposure, 0.06, epsilon = 1e-12);
        assert_relative_eq!(metrics.max_position_size, 0.04, epsilon = 1e-12);
        assert_relative_eq!(metrics.portfolio_correlation, 1.0, epsilon = 1e-9);
    }

    #[tokio::test]
    async fn test_var_uses_one_point_per_day() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.update_position("A", 100, dec!(0.50)).await.expect("A");

        let now = Utc::now();
        for day in 0..12 {
            let pnl = if day % 2 == 0 { dec!(-300) } else { dec!(200) };
            repo.record_performance_snapshot(&PerformanceSnapshot {
                recorded_at: now - ChronoDuration::days(day),
                total_value: dec!(10000) + pnl,
                daily_pnl: pnl,
                cumulative_pnl: pnl,
                total_trades: 0,
                successful_trades: 0,
            })
            .await
            .expect("snapshot");
        }

        let metrics = engine(repo).calculate_portfolio_metrics().await.expect("metrics");
        assert_relative_eq!(metrics.var_95, 0.03, epsilon = 1e-9);
        assert_relative_eq!(metrics.expected_shortfall, 0.03, epsilon = 1e-9);
        assert!(metrics.daily_pnl_volatility > 0.0);
    }

    #[tokio::test]
    async fn test_limit_check_allows_small_trade() {
        let repo = Arc::new(InMemoryRepository::new());
        let check = engine(repo)
            .check_position_limits("M", dec!(500))
            .await
            .expect("check");
        assert!(check.allowed);
        assert_eq!(check.recommended_size, dec!(500));
    }

    #[tokio::test]
    async fn test_limit_check_single_position() {
        let repo = Arc::new(InMemoryRepository::new());
        // 1000 @ 0.60 = 600 already held
        repo.update_position("M", 1000, dec!(0.60)).await.expect("seed");

        let check = engine(repo)
            .check_position_limits("M", dec!(500))
            .await
            .expect("check");
        assert!(!check.allowed);
        assert_eq!(check.violations.len(), 1);
        assert_eq!(check.violations[0].kind, ViolationKind::PositionSizeLimit);
        assert_eq!(check.recommended_size, dec!(400));
    }

    #[tokio::test]
    async fn test_limit_check_portfolio_exposure() {
        let repo = Arc::new(InMemoryRepository::new());
        // Eight 1000 @ 0.95 holdings: 7600 of a 10000 bankroll, each under the single cap
        for id in ["A", "B", "C", "D", "E", "F", "G", "H"] {
            repo.update_position(id, 1000, dec!(0.95)).await.expect("seed");
        }

        let check = engine(repo)
            .check_position_limits("T", dec!(500))
            .await
            .expect("check");
        assert!(!check.allowed);
        assert_eq!(check.violations.len(), 1);
        let violation = &check.violations[0];
        assert_eq!(violation.kind, ViolationKind::PortfolioExposureLimit);
        assert_eq!(violation.severity, RiskLevel::High);
        assert_relative_eq!(violation.current, 0.81, epsilon = 1e-9);
        assert_relative_eq!(violation.limit, 0.8, epsilon = 1e-9);
        // Headroom: 0.8 x 10000 - 7600
        assert_eq!(check.recommended_size, dec!(400));
    }

    #[tokio::test]
    async fn test_limit_check_correlated_concentration() {
        let repo = Arc::new(InMemoryRepository::new());
        for id in ["A", "B", "C"] {
            repo.update_position(id, 100, dec!(0.50)).await.expect("seed");
            push_series(&repo, id, &trending(15, 0.01));
        }
        push_series(&repo, "T", &trending(15, 0.02));

        let check = engine(repo)
            .check_position_limits("T", dec!(500))
            .await
            .expect("check");
        assert!(!check.allowed);
        assert_eq!(check.violations[0].kind, ViolationKind::CorrelationLimit);
        assert_eq!(check.violations[0].severity, RiskLevel::Medium);
        assert_eq!(check.recommended_size, dec!(250));
    }

    #[tokio::test]
    async fn test_update_risk_level_unknown_on_failure() {
        let mut repo = MockRepository::new();
        repo.expect_get_active_positions()
            .returning(|| Err(crate::error::AugurError::Internal("db down".into())));

        let engine = engine(Arc::new(repo));
        assert_eq!(engine.update_risk_level().await, RiskLevel::Unknown);
        assert_eq!(engine.current_risk_level().await, RiskLevel::Unknown);
        assert!(engine.last_metrics().await.is_none());
    }

    #[tokio::test]
    async fn test_update_risk_level_from_exposure() {
        let repo = Arc::new(InMemoryRepository::new());
        // 15000 @ 0.50 = 7500 -> exposure 0.75 and concentration 0.75
        repo.update_position("A", 15000, dec!(0.50)).await.expect("seed");

        let engine = engine(repo);
        assert_eq!(engine.update_risk_level().await, RiskLevel::Critical);
        assert!(engine.last_assessment().await.is_some());
    }
}
