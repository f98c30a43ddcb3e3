//! Portfolio risk engine
//!
//! - Portfolio metrics (exposure, concentration, correlation, VaR, Sharpe, drawdown)
//! - Per-trade limit checks with a recommended size
//! - The process-wide risk level that gates trading
//! - Position risk scoring and the risk report

mod engine;
mod report;

pub use engine::{
    classify_risk_level, daily_volatility, max_drawdown, recommended_size, sharpe_ratio,
    tail_risk, LimitViolation, PortfolioRiskEngine, PositionLimitCheck, RiskLimits,
    ViolationKind, LIMIT_CHECK_HISTORY,
};
pub use report::{recommendations, PositionRisk, RiskReport};
