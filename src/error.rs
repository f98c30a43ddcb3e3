use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::SignalDirection;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum AugurError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    #[error("Market not found: {0}")]
    MarketNotFound(String),

    // Order errors
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Engine lifecycle errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Component failure: {component} - {reason}")]
    ComponentFailure { component: String, reason: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    // Strategy errors
    #[error("Strategy {strategy} failed: {reason}")]
    Strategy { strategy: String, reason: String },

    // Risk errors
    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for AugurError
pub type Result<T> = std::result::Result<T, AugurError>;

/// Why a signal was dropped before execution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalRejection {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("target price {0} outside [0, 1]")]
    TargetPriceOutOfRange(Decimal),

    #[error("size fraction {0} outside [0, 1]")]
    SizeOutOfRange(Decimal),

    #[error("direction {0} is not tradable")]
    NotTradable(SignalDirection),

    #[error("confidence {confidence:.3} below minimum {min:.3}")]
    BelowMinConfidence { confidence: f64, min: f64 },

    #[error("market {0} not found")]
    UnknownMarket(String),

    #[error("market {0} is not active")]
    InactiveMarket(String),

    #[error("risk limits: {0}")]
    RiskLimits(String),

    #[error("strategy validation: {0}")]
    StrategyRule(String),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

/// Per-signal execution failures; each one drops only its own signal
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("market {market_id} has no usable price ({price})")]
    InvalidPrice { market_id: String, price: Decimal },

    #[error("quantity rounds to zero: notional {notional} at price {price}")]
    ZeroQuantity { notional: Decimal, price: Decimal },

    #[error("order {order_id} was not filled")]
    Unfilled { order_id: String },

    #[error("order placement failed: {0}")]
    Order(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("market lookup failed: {0}")]
    MarketLookup(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

/// Risk engine failures; the engine degrades the risk level to UNKNOWN on any of these
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("repository unavailable: {0}")]
    Repository(String),

    #[error("invalid bankroll: {0}")]
    InvalidBankroll(Decimal),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl From<SignalRejection> for AugurError {
    fn from(err: SignalRejection) -> Self {
        AugurError::Validation(err.to_string())
    }
}

impl From<ExecutionError> for AugurError {
    fn from(err: ExecutionError) -> Self {
        AugurError::OrderSubmission(err.to_string())
    }
}

impl From<RiskError> for AugurError {
    fn from(err: RiskError) -> Self {
        AugurError::RiskLimitExceeded(err.to_string())
    }
}
