use serde::{Deserialize, Serialize};

/// Portfolio-wide risk gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
    /// Metrics could not be computed
    Unknown,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
            RiskLevel::Unknown => "UNKNOWN",
        }
    }

    /// Ordinal for the known levels; UNKNOWN has none
    pub fn severity(&self) -> Option<u8> {
        match self {
            RiskLevel::Low => Some(0),
            RiskLevel::Medium => Some(1),
            RiskLevel::High => Some(2),
            RiskLevel::Critical => Some(3),
            RiskLevel::Unknown => None,
        }
    }

    /// Whether new trades are suspended at this level
    pub fn blocks_trading(&self, block_on_unknown: bool) -> bool {
        match self {
            RiskLevel::Critical => true,
            RiskLevel::Unknown => block_on_unknown,
            _ => false,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time portfolio metrics. Everything except Sharpe is a fraction of bankroll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub total_exposure: f64,
    pub max_position_size: f64,
    pub portfolio_correlation: f64,
    pub var_95: f64,
    pub expected_shortfall: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub daily_pnl_volatility: f64,
}
