//! Strategy module
//!
//! Signal generation and the path from raw signals to an executable set.
//!
//! ## Architecture
//!
//! - `traits` - the [`SignalStrategy`] contract
//! - `runtime` - per-strategy lifecycle, fault isolation and statistics
//! - `validation` - composable signal validators
//! - `pipeline` - validity, risk sizing, dedup, ranking and cap for one cycle
//! - `strategies` - built-in signal sources
//! - `calculations` - shared statistics

pub mod calculations;
pub mod pipeline;
pub mod runtime;
pub mod strategies;
pub mod traits;
pub mod validation;

pub use pipeline::{
    cap_signals, dedup_signals, rank_signals, PipelineConfig, PipelineOutput, PipelineReport,
    SignalPipeline,
};
pub use runtime::{StrategyPerformance, StrategyRegistry, StrategyRuntime, StrategyStatus};
pub use strategies::{builtin_strategies, SentimentStrategy, StatisticalArbitrageStrategy};
pub use traits::{stamp_signals, SignalStrategy};
pub use validation::{SignalValidator, ValidationChain};
