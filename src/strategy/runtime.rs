//! Strategy runtime wrapper
//!
//! Gives every [`SignalStrategy`] the same lifecycle: enable flag, optional
//! pre/post-processing, fault isolation (errors and panics), minimum-contract
//! validation, and execution statistics.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::traits::SignalStrategy;
use super::validation::ValidationChain;
use crate::domain::{MarketSnapshot, Signal};
use crate::error::{AugurError, Result};

/// Point-in-time view of one strategy's runtime state
#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub name: String,
    pub enabled: bool,
    pub last_execution: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyPerformance {
    pub name: String,
    pub execution_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

pub struct StrategyRuntime {
    name: String,
    strategy: Arc<dyn SignalStrategy>,
    contract: ValidationChain,
    /// Upper bound on one execution, including the strategy's own lookups
    time_limit: Option<Duration>,
    enabled: AtomicBool,
    execution_count: AtomicU64,
    error_count: AtomicU64,
    last_execution: RwLock<Option<DateTime<Utc>>>,
}

impl StrategyRuntime {
    pub fn new(strategy: Arc<dyn SignalStrategy>) -> Self {
        Self {
            name: strategy.name().to_string(),
            strategy,
            contract: ValidationChain::contract(),
            time_limit: None,
            enabled: AtomicBool::new(true),
            execution_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            last_execution: RwLock::new(None),
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        info!("Strategy {} enabled", self.name);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        info!("Strategy {} disabled", self.name);
    }

    /// Run the strategy once against a snapshot.
    ///
    /// Never fails: any fault, a time-limit overrun included, is counted and
    /// yields no signals.
    pub async fn execute(&self, snapshot: &MarketSnapshot) -> Vec<Signal> {
        if !self.is_enabled() {
            debug!("Strategy {} is disabled, skipping", self.name);
            return Vec::new();
        }

        let guarded = AssertUnwindSafe(self.run(snapshot)).catch_unwind();
        let outcome = match self.time_limit {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(AugurError::Timeout(format!(
                    "strategy {} exceeded {}s",
                    self.name,
                    limit.as_secs_f64()
                )))),
            },
            None => guarded.await,
        };

        let signals = match outcome {
            Ok(Ok(signals)) => signals,
            Ok(Err(e)) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                error!("Strategy {} failed: {}", self.name, e);
                Vec::new()
            }
            Err(panic) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                error!(
                    "Strategy {} panicked: {}",
                    self.name,
                    panic_message(panic.as_ref())
                );
                Vec::new()
            }
        };

        self.execution_count.fetch_add(1, Ordering::Relaxed);
        *self.last_execution.write().await = Some(Utc::now());

        signals
    }

    async fn run(&self, snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        let prepared = self.strategy.preprocess(snapshot.clone()).await?;
        let generated = self.strategy.generate_signals(&prepared).await?;
        let processed = self.strategy.postprocess(generated);

        let produced = processed.len();
        let mut valid = Vec::with_capacity(produced);
        for signal in processed {
            if let Err(reason) = self.contract.validate(&signal) {
                warn!(
                    strategy = %self.name,
                    market_id = %signal.market_id,
                    %reason,
                    "dropping invalid signal"
                );
                continue;
            }
            if let Err(reason) = self.strategy.validate_signal(&signal).await {
                debug!(
                    strategy = %self.name,
                    market_id = %signal.market_id,
                    %reason,
                    "strategy rejected signal"
                );
                continue;
            }
            valid.push(signal);
        }

        debug!(
            "Strategy {} produced {} signals, {} valid",
            self.name,
            produced,
            valid.len()
        );
        Ok(valid)
    }

    pub async fn status(&self) -> StrategyStatus {
        let execution_count = self.execution_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);
        StrategyStatus {
            name: self.name.clone(),
            enabled: self.is_enabled(),
            last_execution: *self.last_execution.read().await,
            execution_count,
            error_count,
            error_rate: error_count as f64 / execution_count.max(1) as f64,
        }
    }

    pub async fn performance_metrics(&self) -> StrategyPerformance {
        let execution_count = self.execution_count.load(Ordering::Relaxed);
        let error_count = self.error_count.load(Ordering::Relaxed);
        let success_rate = (execution_count as f64 - error_count as f64).max(0.0)
            / execution_count.max(1) as f64;
        StrategyPerformance {
            name: self.name.clone(),
            execution_count,
            error_count,
            success_rate,
            last_execution: *self.last_execution.read().await,
        }
    }

    pub async fn reset_statistics(&self) {
        self.execution_count.store(0, Ordering::Relaxed);
        self.error_count.store(0, Ordering::Relaxed);
        *self.last_execution.write().await = None;
        info!("Strategy {} statistics reset", self.name);
    }
}

/// Registered strategies in registration order
#[derive(Default)]
pub struct StrategyRegistry {
    runtimes: Vec<Arc<StrategyRuntime>>,
    time_limit: Option<Duration>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose runtimes are each bounded by `limit` per execution
    pub fn with_time_limit(limit: Duration) -> Self {
        Self {
            runtimes: Vec::new(),
            time_limit: Some(limit),
        }
    }

    /// Register a strategy; names must be unique
    pub fn register(&mut self, strategy: Arc<dyn SignalStrategy>) -> Result<Arc<StrategyRuntime>> {
        if self.get(strategy.name()).is_some() {
            return Err(AugurError::InvalidConfig(format!(
                "strategy {} registered twice",
                strategy.name()
            )));
        }
        let mut runtime = StrategyRuntime::new(strategy);
        if let Some(limit) = self.time_limit {
            runtime = runtime.with_time_limit(limit);
        }
        let runtime = Arc::new(runtime);
        info!("Registered strategy {}", runtime.name());
        self.runtimes.push(runtime.clone());
        Ok(runtime)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<StrategyRuntime>> {
        self.runtimes.iter().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StrategyRuntime>> {
        self.runtimes.iter()
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
