use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Per-strategy settings keyed by strategy name
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategySettings>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Capital base every size fraction is measured against
    #[serde(default = "default_bankroll")]
    pub bankroll: Decimal,
    /// Max single-position size as a fraction of bankroll (e.g., 0.10 = 10%)
    #[serde(default = "default_max_position_fraction")]
    pub max_position_fraction: Decimal,
    /// Signals below this confidence never reach sizing
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Sleep between cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Sleep after a failed cycle
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_max_signals")]
    pub max_signals_per_cycle: usize,
    /// Size fraction used when a strategy leaves it unset
    #[serde(default = "default_size_fraction")]
    pub default_size_fraction: Decimal,
    /// Active markets pulled per cycle
    #[serde(default = "default_snapshot_limit")]
    pub market_snapshot_limit: u32,
    /// Trading enabled at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_bankroll() -> Decimal {
    dec!(10000)
}

fn default_max_position_fraction() -> Decimal {
    dec!(0.10)
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_cycle_interval() -> u64 {
    60
}

fn default_error_backoff() -> u64 {
    60
}

fn default_max_signals() -> usize {
    5
}

fn default_size_fraction() -> Decimal {
    dec!(0.05)
}

fn default_snapshot_limit() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            bankroll: default_bankroll(),
            max_position_fraction: default_max_position_fraction(),
            min_confidence: default_min_confidence(),
            cycle_interval_secs: default_cycle_interval(),
            error_backoff_secs: default_error_backoff(),
            max_signals_per_cycle: default_max_signals(),
            default_size_fraction: default_size_fraction(),
            market_snapshot_limit: default_snapshot_limit(),
            enabled: true,
        }
    }
}

impl TradingConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Max total exposure as a fraction of bankroll
    #[serde(default = "default_max_exposure")]
    pub max_portfolio_exposure: Decimal,
    /// Pairwise |correlation| above which two positions count as concentrated
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
    /// Number of correlated existing positions that trips the concentration check
    #[serde(default = "default_correlated_limit")]
    pub correlated_position_limit: usize,
    /// Correlation at which a position's correlation risk score saturates
    #[serde(default = "default_max_correlation")]
    pub max_correlation: f64,
    /// Days of performance history fed into VaR / Sharpe / drawdown
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Price points per market used for correlation
    #[serde(default = "default_price_window")]
    pub price_history_window: u32,
    /// Treat an UNKNOWN risk level like CRITICAL
    #[serde(default)]
    pub block_on_unknown: bool,
    /// Execute disallowed signals at the recommended size instead of dropping them
    #[serde(default)]
    pub allow_downsizing: bool,
}

fn default_max_exposure() -> Decimal {
    dec!(0.8)
}

fn default_correlation_threshold() -> f64 {
    0.5
}

fn default_correlated_limit() -> usize {
    3
}

fn default_max_correlation() -> f64 {
    0.7
}

fn default_lookback_days() -> u32 {
    30
}

fn default_price_window() -> u32 {
    50
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_portfolio_exposure: default_max_exposure(),
            correlation_threshold: default_correlation_threshold(),
            correlated_position_limit: default_correlated_limit(),
            max_correlation: default_max_correlation(),
            lookback_days: default_lookback_days(),
            price_history_window: default_price_window(),
            block_on_unknown: false,
            allow_downsizing: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How long stop() waits for the loop to exit
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
    /// Upper bound on any single gateway/repository call
    #[serde(default = "default_collaborator_timeout")]
    pub collaborator_timeout_secs: u64,
    /// Commit trades at the quote without sending orders
    #[serde(default = "default_true")]
    pub dry_run: bool,
}

fn default_join_timeout() -> u64 {
    10
}

fn default_collaborator_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join_timeout_secs: default_join_timeout(),
            collaborator_timeout_secs: default_collaborator_timeout(),
            dry_run: true,
        }
    }
}

impl EngineConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_url")]
    pub base_url: String,
    /// API key id (AUGUR_EXCHANGE__API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,
    /// HMAC secret (AUGUR_EXCHANGE__API_SECRET)
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// JSON market book for paper mode
    #[serde(default)]
    pub paper_markets_file: Option<PathBuf>,
}

fn default_exchange_url() -> String {
    crate::adapters::kalshi_rest::DEFAULT_KALSHI_API_BASE.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_rate_limit() -> u32 {
    100
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_exchange_url(),
            api_key: None,
            api_secret: None,
            request_timeout_secs: default_request_timeout(),
            rate_limit_per_minute: default_rate_limit(),
            paper_markets_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; in-memory repository when unset
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Ranking weight; strategies without one are weighted equally
    #[serde(default)]
    pub weight: Option<f64>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            weight: None,
        }
    }
}

/// Weight applied to strategies with no configured weight
pub const DEFAULT_STRATEGY_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let env_name = std::env::var("AUGUR_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific file (e.g., config/production.toml)
            .add_source(File::from(config_dir.join(format!("{env_name}.toml"))).required(false))
            // AUGUR_TRADING__BANKROLL=5000, AUGUR_DATABASE__URL=..., etc.
            .add_source(
                Environment::with_prefix("AUGUR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Settings for a strategy, falling back to enabled/equal weight
    pub fn strategy_settings(&self, name: &str) -> StrategySettings {
        self.strategies.get(name).cloned().unwrap_or_default()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.trading.bankroll <= Decimal::ZERO {
            errors.push("trading.bankroll must be positive".to_string());
        }

        let fractions = [
            ("trading.max_position_fraction", self.trading.max_position_fraction),
            ("trading.default_size_fraction", self.trading.default_size_fraction),
            ("risk.max_portfolio_exposure", self.risk.max_portfolio_exposure),
        ];
        for (name, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                errors.push(format!("{name} must be in (0, 1], got {value}"));
            }
        }

        if !(0.0..=1.0).contains(&self.trading.min_confidence) {
            errors.push("trading.min_confidence must be in [0, 1]".to_string());
        }

        if !(0.0..=1.0).contains(&self.risk.correlation_threshold) {
            errors.push("risk.correlation_threshold must be in [0, 1]".to_string());
        }

        if !(self.risk.max_correlation > 0.0 && self.risk.max_correlation <= 1.0) {
            errors.push("risk.max_correlation must be in (0, 1]".to_string());
        }

        if self.trading.max_signals_per_cycle == 0 {
            errors.push("trading.max_signals_per_cycle must be at least 1".to_string());
        }

        if self.engine.join_timeout_secs == 0 || self.engine.collaborator_timeout_secs == 0 {
            errors.push("engine timeouts must be positive".to_string());
        }

        for (name, settings) in &self.strategies {
            if let Some(weight) = settings.weight {
                if !weight.is_finite() || weight < 0.0 {
                    errors.push(format!("strategies.{name}.weight must be non-negative"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trading.bankroll, dec!(10000));
        assert_eq!(config.trading.max_signals_per_cycle, 5);
        assert_eq!(config.engine.join_timeout(), Duration::from_secs(10));
        assert!(!config.risk.block_on_unknown);
    }

    #[test]
    fn test_validate_rejects_bad_fractions() {
        let mut config = AppConfig::default();
        config.trading.bankroll = Decimal::ZERO;
        config.trading.max_position_fraction = dec!(1.5);

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("bankroll"));
        assert!(errors[1].contains("max_position_fraction"));
    }

    #[test]
    fn test_strategy_settings_fallback() {
        let mut config = AppConfig::default();
        config.strategies.insert(
            "sentiment".to_string(),
            StrategySettings {
                enabled: false,
                weight: Some(0.5),
            },
        );

        assert!(!config.strategy_settings("sentiment").enabled);
        let fallback = config.strategy_settings("statistical_arbitrage");
        assert!(fallback.enabled);
        assert!(fallback.weight.is_none());
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/augur-config").unwrap();
        assert_eq!(config.trading.cycle_interval_secs, 60);
        assert_eq!(config.logging.level, "info");
    }
}
