//! Decision-and-risk core of an unattended prediction-market trading bot.
//!
//! A [`TradingEngine`] runs strategies over a market snapshot, filters and
//! ranks their signals through the [`strategy::SignalPipeline`], gates every
//! trade on the [`risk::PortfolioRiskEngine`], and commits the survivors
//! through a [`exchange::MarketGateway`] and a [`persistence::Repository`].

pub mod adapters;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod ml;
pub mod persistence;
pub mod risk;
pub mod strategy;

pub use config::AppConfig;
pub use coordinator::{EngineStatus, ShutdownOutcome, TradingEngine};
pub use error::{AugurError, Result};
