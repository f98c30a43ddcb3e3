//! Engine lifecycle state and the status views it exposes

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Position, RiskLevel, Trade};
use crate::strategy::{PipelineReport, StrategyStatus};

/// Stopped -> Running -> Stopping -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Running,
    Stopping,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Running => "running",
            EngineState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot returned by `TradingEngine::get_status`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub running: bool,
    pub trading_enabled: bool,
    pub dry_run: bool,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub error_count: u64,
    pub daily_pnl: Decimal,
    pub total_trades_today: u64,
    pub successful_trades_today: u64,
    pub risk_level: RiskLevel,
    pub strategies: Vec<StrategyStatus>,
}

/// Why a cycle ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CycleOutcome {
    TradingDisabled,
    /// Sync or snapshot failed; retried next cycle
    NoMarketData { reason: String },
    RiskBlocked { level: RiskLevel },
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub markets: usize,
    pub signals_generated: usize,
    pub pipeline: PipelineReport,
    pub trades: Vec<ExecutedTrade>,
    pub execution_failures: usize,
}

impl CycleReport {
    pub fn skipped(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            markets: 0,
            signals_generated: 0,
            pipeline: PipelineReport::default(),
            trades: Vec::new(),
            execution_failures: 0,
        }
    }

    pub fn executed(&self) -> bool {
        self.outcome == CycleOutcome::Completed
    }
}

/// A committed trade and the position it left behind
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTrade {
    pub signal_id: Uuid,
    pub trade: Trade,
    /// `None` when the fill closed the position
    pub position: Option<Position>,
}

/// How `stop()` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownOutcome {
    NotRunning,
    /// The loop exited within the join timeout
    Clean,
    /// The join timed out; the loop task was aborted
    Abandoned,
}
