//! Trading coordinator
//!
//! Runs the periodic trading cycle and owns the engine lifecycle:
//! market snapshot, risk gate, strategies, pipeline, execution and
//! performance bookkeeping.

pub mod engine;
pub mod executor;
pub mod performance;
pub mod state;

pub use engine::{TradingEngine, PERFORMANCE_SUMMARY_DAYS};
pub use executor::{order_quantity, TradeExecutor};
pub use performance::{summarize, PerformanceTracker};
pub use state::{
    CycleOutcome, CycleReport, EngineState, EngineStatus, ExecutedTrade, ShutdownOutcome,
};
