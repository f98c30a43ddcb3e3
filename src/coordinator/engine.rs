//! Trading engine
//!
//! Owns the periodic cycle and its lifecycle. One background task runs
//! cycles back to back with an interruptible sleep in between; the
//! administrative surface (status, enable/disable, stop) is safe to call
//! while a cycle is in flight.
//!
//! ```text
//!  sync + snapshot -> risk gate -> strategies -> pipeline -> execution -> snapshot
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::TradeExecutor;
use super::performance::PerformanceTracker;
use super::state::{
    CycleOutcome, CycleReport, EngineState, EngineStatus, ShutdownOutcome,
};
use crate::config::{AppConfig, DEFAULT_STRATEGY_WEIGHT};
use crate::domain::{MarketSnapshot, MarketStatus, PerformanceSummary, WeightedSignal};
use crate::error::{AugurError, Result};
use crate::exchange::MarketGateway;
use crate::persistence::Repository;
use crate::risk::{PortfolioRiskEngine, RiskLimits, RiskReport};
use crate::strategy::{PipelineConfig, SignalPipeline, SignalStrategy, StrategyRegistry};

/// Days covered by `performance_summary`
pub const PERFORMANCE_SUMMARY_DAYS: u32 = 30;

#[derive(Debug, Clone)]
struct EngineSettings {
    cycle_interval: Duration,
    error_backoff: Duration,
    join_timeout: Duration,
    call_timeout: Duration,
    snapshot_limit: u32,
    block_on_unknown: bool,
    dry_run: bool,
}

impl EngineSettings {
    fn from_config(config: &AppConfig) -> Self {
        Self {
            cycle_interval: config.trading.cycle_interval(),
            error_backoff: config.trading.error_backoff(),
            join_timeout: config.engine.join_timeout(),
            call_timeout: config.engine.collaborator_timeout(),
            snapshot_limit: config.trading.market_snapshot_limit,
            block_on_unknown: config.risk.block_on_unknown,
            dry_run: config.engine.dry_run,
        }
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared between the engine handle and its loop task
struct EngineInner {
    settings: EngineSettings,
    gateway: Arc<dyn MarketGateway>,
    repository: Arc<dyn Repository>,
    risk: Arc<PortfolioRiskEngine>,
    pipeline: SignalPipeline,
    executor: TradeExecutor,
    performance: PerformanceTracker,
    registry: StrategyRegistry,
    weights: HashMap<String, f64>,
    trading_enabled: AtomicBool,
    execution_count: AtomicU64,
    error_count: AtomicU64,
    last_execution: RwLock<Option<DateTime<Utc>>>,
    /// Held for the duration of a cycle
    cycle_lock: Mutex<()>,
}

pub struct TradingEngine {
    inner: Arc<EngineInner>,
    state: RwLock<EngineState>,
    worker: Mutex<Option<Worker>>,
}

impl TradingEngine {
    /// Build the engine and register `strategies` in the given order.
    ///
    /// Strategies disabled in config are registered but start disabled.
    pub fn new(
        config: &AppConfig,
        gateway: Arc<dyn MarketGateway>,
        repository: Arc<dyn Repository>,
        strategies: Vec<Arc<dyn SignalStrategy>>,
    ) -> Result<Self> {
        let settings = EngineSettings::from_config(config);
        let bankroll = config.trading.bankroll;

        let risk = Arc::new(PortfolioRiskEngine::new(
            repository.clone(),
            RiskLimits::from_config(&config.trading, &config.risk),
            settings.call_timeout,
        )?);
        let pipeline = SignalPipeline::new(
            PipelineConfig::from_config(config),
            repository.clone(),
            risk.clone(),
        );
        let executor = TradeExecutor::new(
            repository.clone(),
            gateway.clone(),
            bankroll,
            settings.dry_run,
            settings.call_timeout,
        );
        let performance = PerformanceTracker::new(repository.clone(), bankroll);

        let mut registry = StrategyRegistry::with_time_limit(settings.call_timeout);
        let mut weights = HashMap::new();
        for strategy in strategies {
            let runtime = registry.register(strategy)?;
            let strategy_settings = config.strategy_settings(runtime.name());
            if !strategy_settings.enabled {
                runtime.disable();
            }
            weights.insert(
                runtime.name().to_string(),
                strategy_settings.weight.unwrap_or(DEFAULT_STRATEGY_WEIGHT),
            );
        }

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                gateway,
                repository,
                risk,
                pipeline,
                executor,
                performance,
                registry,
                weights,
                trading_enabled: AtomicBool::new(config.trading.enabled),
                execution_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                last_execution: RwLock::new(None),
                cycle_lock: Mutex::new(()),
            }),
            state: RwLock::new(EngineState::Stopped),
            worker: Mutex::new(None),
        })
    }

    // ==================== Lifecycle ====================

    /// Check collaborators and launch the cycle loop. Returns once the loop
    /// is spawned; a second call while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            warn!("Trading engine is already running");
            return Ok(());
        }

        self.inner.preflight().await?;

        let token = CancellationToken::new();
        let inner = self.inner.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { inner.run_loop(loop_token).await });

        *worker = Some(Worker { token, handle });
        *self.state.write().await = EngineState::Running;
        info!(
            strategies = self.inner.registry.len(),
            dry_run = self.inner.settings.dry_run,
            "Trading engine started"
        );
        Ok(())
    }

    /// Signal the loop to exit and wait up to the join timeout.
    ///
    /// The inter-cycle sleep is interrupted immediately; an in-flight cycle
    /// finishes on its own. If the join times out the task is aborted and
    /// `Abandoned` is returned.
    pub async fn stop(&self) -> ShutdownOutcome {
        let mut worker = self.worker.lock().await;
        let Some(Worker { token, mut handle }) = worker.take() else {
            debug!("Trading engine is not running");
            return ShutdownOutcome::NotRunning;
        };

        *self.state.write().await = EngineState::Stopping;
        info!("Stopping trading engine");
        token.cancel();

        let join_timeout = self.inner.settings.join_timeout;
        let outcome = match tokio::time::timeout(join_timeout, &mut handle).await {
            Ok(Ok(())) => ShutdownOutcome::Clean,
            Ok(Err(e)) => {
                error!("Trading loop terminated abnormally: {}", e);
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!(
                    timeout_secs = join_timeout.as_secs(),
                    "Trading loop did not exit in time; abandoning it"
                );
                handle.abort();
                ShutdownOutcome::Abandoned
            }
        };

        *self.state.write().await = EngineState::Stopped;
        info!("Trading engine stopped");
        outcome
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Run one cycle on the caller's task. Waits for any cycle in flight.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.inner.run_cycle().await
    }

    // ==================== Administration ====================

    pub fn enable_trading(&self) {
        self.inner.trading_enabled.store(true, Ordering::Relaxed);
        info!("Trading enabled");
    }

    pub fn disable_trading(&self) {
        self.inner.trading_enabled.store(false, Ordering::Relaxed);
        info!("Trading disabled");
    }

    pub fn is_trading_enabled(&self) -> bool {
        self.inner.trading_enabled.load(Ordering::Relaxed)
    }

    pub fn enable_strategy(&self, name: &str) -> Result<()> {
        self.inner.runtime(name)?.enable();
        Ok(())
    }

    pub fn disable_strategy(&self, name: &str) -> Result<()> {
        self.inner.runtime(name)?.disable();
        Ok(())
    }

    pub async fn get_status(&self) -> EngineStatus {
        let state = self.state().await;
        let inner = &self.inner;
        let (total_trades_today, successful_trades_today) = inner.performance.trades_today().await;

        let mut strategies = Vec::with_capacity(inner.registry.len());
        for runtime in inner.registry.iter() {
            strategies.push(runtime.status().await);
        }

        EngineStatus {
            state,
            running: state == EngineState::Running,
            trading_enabled: self.is_trading_enabled(),
            dry_run: inner.settings.dry_run,
            last_execution_time: *inner.last_execution.read().await,
            execution_count: inner.execution_count.load(Ordering::Relaxed),
            error_count: inner.error_count.load(Ordering::Relaxed),
            daily_pnl: inner.performance.daily_pnl().await,
            total_trades_today,
            successful_trades_today,
            risk_level: inner.risk.current_risk_level().await,
            strategies,
        }
    }

    /// Read-only: the report's level is computed fresh, the loop's level is untouched
    pub async fn risk_report(&self) -> Result<RiskReport> {
        Ok(self.inner.risk.risk_report().await?)
    }

    pub async fn performance_summary(&self) -> Result<PerformanceSummary> {
        self.inner
            .performance
            .summary(PERFORMANCE_SUMMARY_DAYS)
            .await
    }
}

impl EngineInner {
    fn runtime(&self, name: &str) -> Result<&Arc<crate::strategy::StrategyRuntime>> {
        self.registry
            .get(name)
            .ok_or_else(|| AugurError::Validation(format!("unknown strategy: {name}")))
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.call_timeout, fut)
            .await
            .map_err(|_| {
                AugurError::Timeout(format!(
                    "{operation} exceeded {}s",
                    self.settings.call_timeout.as_secs()
                ))
            })?
    }

    /// Both collaborators must answer before the loop is launched
    async fn preflight(&self) -> Result<()> {
        self.bounded("gateway ping", self.gateway.ping())
            .await
            .map_err(|e| AugurError::ComponentFailure {
                component: self.gateway.kind().to_string(),
                reason: e.to_string(),
            })?;
        self.bounded("repository ping", self.repository.ping())
            .await
            .map_err(|e| AugurError::ComponentFailure {
                component: "repository".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn run_loop(self: Arc<Self>, token: CancellationToken) {
        info!("Trading loop started");

        while !token.is_cancelled() {
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    debug!(outcome = ?report.outcome, "Cycle finished");
                    self.settings.cycle_interval
                }
                Err(e) => {
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    error!("Error in trading cycle: {}", e);
                    self.settings.error_backoff
                }
            };

            if let Err(e) = self.bounded("performance snapshot", self.performance.snapshot()).await {
                error!("Error updating performance metrics: {}", e);
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Trading loop exited");
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;

        if !self.trading_enabled.load(Ordering::Relaxed) {
            debug!("Trading disabled, skipping cycle");
            return Ok(CycleReport::skipped(CycleOutcome::TradingDisabled));
        }

        // Market data
        let synced = self
            .bounded("sync_market_data", self.gateway.sync_market_data())
            .await?;
        if !synced {
            warn!("Market data sync failed, skipping cycle");
            return Ok(CycleReport::skipped(CycleOutcome::NoMarketData {
                reason: "market data sync failed".to_string(),
            }));
        }
        let page = self
            .bounded(
                "list_markets",
                self.gateway.list_markets(
                    Some(MarketStatus::Active),
                    self.settings.snapshot_limit,
                    None,
                ),
            )
            .await?;
        if page.markets.is_empty() {
            warn!("No active markets available, skipping cycle");
            return Ok(CycleReport::skipped(CycleOutcome::NoMarketData {
                reason: "no active markets".to_string(),
            }));
        }
        let snapshot = MarketSnapshot::new(page.markets);
        let markets = snapshot.len();

        // Risk gate
        let level = self.risk.update_risk_level().await;
        if level.blocks_trading(self.settings.block_on_unknown) {
            warn!("Risk level {}, suspending trading this cycle", level);
            return Ok(CycleReport::skipped(CycleOutcome::RiskBlocked { level }));
        }

        // Strategies, in registration order
        let mut weighted = Vec::new();
        for runtime in self.registry.iter() {
            let weight = self
                .weights
                .get(runtime.name())
                .copied()
                .unwrap_or(DEFAULT_STRATEGY_WEIGHT);
            weighted.extend(
                runtime
                    .execute(&snapshot)
                    .await
                    .into_iter()
                    .map(|signal| WeightedSignal::new(signal, weight)),
            );
        }
        let signals_generated = weighted.len();

        let output = self.pipeline.process(weighted).await;

        // Execution; failures are scoped to the signal
        let mut trades = Vec::with_capacity(output.signals.len());
        let mut execution_failures = 0;
        for candidate in &output.signals {
            match self.executor.execute(&candidate.signal).await {
                Ok(executed) => trades.push(executed),
                Err(e) => {
                    execution_failures += 1;
                    warn!(
                        market_id = %candidate.signal.market_id,
                        strategy = %candidate.signal.strategy,
                        error = %e,
                        "Signal execution failed"
                    );
                }
            }
        }

        self.execution_count.fetch_add(1, Ordering::Relaxed);
        *self.last_execution.write().await = Some(Utc::now());
        self.performance
            .record_cycle(
                (trades.len() + execution_failures) as u64,
                trades.len() as u64,
            )
            .await;

        info!(
            "Trading cycle completed: {} markets, {} signals, {} executed, {} failed",
            markets,
            signals_generated,
            trades.len(),
            execution_failures
        );

        Ok(CycleReport {
            outcome: CycleOutcome::Completed,
            markets,
            signals_generated,
            pipeline: output.report,
            trades,
            execution_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryRepository;
    use crate::config::StrategySettings;
    use crate::domain::{Market, RiskLevel, Signal, SignalDirection};
    use crate::domain::NewsArticle;
    use crate::exchange::{ExchangeKind, MockMarketGateway, PaperGateway};
    use crate::ml::{SentimentScore, SentimentScorer};
    use crate::persistence::MockRepository;
    use crate::strategy::strategies::{SentimentConfig, SentimentStrategy};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tokio::sync::Notify;

    fn market(id: &str, yes: Decimal) -> Market {
        Market {
            id: id.to_string(),
            title: format!("Market {id}"),
            subtitle: None,
            category: None,
            status: MarketStatus::Active,
            yes_price: yes,
            no_price: Decimal::ONE - yes,
            volume: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            close_time: None,
            updated_at: Utc::now(),
        }
    }

    /// Emits a fixed buy on one market, optionally after a delay
    struct FixedStrategy {
        name: &'static str,
        market_id: &'static str,
        confidence: f64,
        delay: Duration,
        entered: Arc<Notify>,
        calls: AtomicUsize,
    }

    impl FixedStrategy {
        fn new(name: &'static str, market_id: &'static str, confidence: f64) -> Self {
            Self {
                name,
                market_id,
                confidence,
                delay: Duration::ZERO,
                entered: Arc::new(Notify::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl SignalStrategy for FixedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate_signals(&self, _snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(vec![Signal::new(
                self.market_id,
                SignalDirection::Buy,
                self.confidence,
                dec!(0.05),
            )])
        }
    }

    struct FailingStrategy;

    #[async_trait]
    impl SignalStrategy for FailingStrategy {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate_signals(&self, _snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
            Err(AugurError::Internal("model unavailable".to_string()))
        }
    }

    fn paper_engine(
        config: &AppConfig,
        strategies: Vec<Arc<dyn SignalStrategy>>,
    ) -> (TradingEngine, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let gateway = Arc::new(PaperGateway::new(
            repo.clone(),
            vec![market("M", dec!(0.40)), market("N", dec!(0.55))],
        ));
        let engine = TradingEngine::new(config, gateway, repo.clone(), strategies).expect("engine");
        (engine, repo)
    }

    /// Scorer that never answers
    struct StalledScorer;

    #[async_trait]
    impl SentimentScorer for StalledScorer {
        async fn score_text(&self, _text: &str) -> Result<SentimentScore> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(SentimentScore::NEUTRAL)
        }
    }

    /// Repository whose position reads fail, so the risk level is UNKNOWN
    fn positions_unavailable_repository() -> MockRepository {
        let mut repo = MockRepository::new();
        repo.expect_upsert_market().returning(|_| Ok(()));
        repo.expect_record_price_point()
            .returning(|_, _, _, _| Ok(()));
        repo.expect_get_active_positions()
            .returning(|| Err(AugurError::Internal("positions table locked".into())));
        repo.expect_get_market().returning(|_| Ok(None));
        repo
    }

    async fn wait_for_cycles(engine: &TradingEngine, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.get_status().await.execution_count < count {
            assert!(Instant::now() < deadline, "cycle never completed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_cycle_executes_signal() {
        let config = AppConfig::default();
        let (engine, repo) = paper_engine(
            &config,
            vec![Arc::new(FixedStrategy::new("fixed", "M", 0.8))],
        );

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.markets, 2);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].trade.quantity, 1250);
        assert_eq!(repo.position("M").expect("position").quantity, 1250);

        let status = engine.get_status().await;
        assert_eq!(status.execution_count, 1);
        assert_eq!(status.total_trades_today, 1);
        assert_eq!(status.successful_trades_today, 1);
        assert!(status.last_execution_time.is_some());
    }

    #[tokio::test]
    async fn test_start_then_stop_interrupts_sleep() {
        let config = AppConfig::default();
        let (engine, repo) = paper_engine(
            &config,
            vec![Arc::new(FixedStrategy::new("fixed", "M", 0.8))],
        );

        engine.start().await.expect("start");
        assert_eq!(engine.state().await, EngineState::Running);
        // Second start is a no-op
        engine.start().await.expect("start again");

        wait_for_cycles(&engine, 1).await;

        // Loop is now in its 60s sleep
        let started = Instant::now();
        assert_eq!(engine.stop().await, ShutdownOutcome::Clean);
        assert!(started.elapsed() < Duration::from_secs(2));

        let status = engine.get_status().await;
        assert!(!status.running);
        assert_eq!(status.state, EngineState::Stopped);
        assert_eq!(status.execution_count, 1);
        assert!(!repo.snapshots().await.is_empty());
        assert_eq!(engine.stop().await, ShutdownOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let config = AppConfig::default();
        let strategy = Arc::new(FixedStrategy::new("slow", "M", 0.8).slow(Duration::from_millis(300)));
        let entered = strategy.entered.clone();
        let (engine, repo) = paper_engine(&config, vec![strategy.clone()]);

        engine.start().await.expect("start");
        entered.notified().await;

        assert_eq!(engine.stop().await, ShutdownOutcome::Clean);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get_status().await.execution_count, 1);
        assert!(repo.position("M").is_some());
    }

    #[tokio::test]
    async fn test_stop_abandons_hung_cycle() {
        let mut config = AppConfig::default();
        config.engine.join_timeout_secs = 1;
        let strategy = Arc::new(FixedStrategy::new("hung", "M", 0.8).slow(Duration::from_secs(30)));
        let entered = strategy.entered.clone();
        let (engine, _repo) = paper_engine(&config, vec![strategy]);

        engine.start().await.expect("start");
        entered.notified().await;

        assert_eq!(engine.stop().await, ShutdownOutcome::Abandoned);
        assert_eq!(engine.state().await, EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_trading_disabled_skips_cycle() {
        let config = AppConfig::default();
        let strategy = Arc::new(FixedStrategy::new("fixed", "M", 0.8));
        let (engine, repo) = paper_engine(&config, vec![strategy.clone()]);

        engine.disable_trading();
        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::TradingDisabled);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
        assert!(repo.trades().await.is_empty());

        engine.enable_trading();
        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::Completed);
    }

    #[tokio::test]
    async fn test_critical_risk_blocks_before_strategies() {
        let config = AppConfig::default();
        let strategy = Arc::new(FixedStrategy::new("fixed", "M", 0.8));
        let (engine, repo) = paper_engine(&config, vec![strategy.clone()]);
        // 8000 notional on a 10000 bankroll: exposure and concentration both high
        repo.update_position("X", 20000, dec!(0.40))
            .await
            .expect("seed");

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(
            report.outcome,
            CycleOutcome::RiskBlocked {
                level: RiskLevel::Critical
            }
        );
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
        assert!(repo.position("M").is_none());
        assert_eq!(engine.get_status().await.risk_level, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn test_unknown_risk_does_not_block_by_default() {
        let config = AppConfig::default();
        let repo = Arc::new(positions_unavailable_repository());
        let gateway = Arc::new(PaperGateway::new(repo.clone(), vec![market("M", dec!(0.40))]));
        let strategy = Arc::new(FixedStrategy::new("fixed", "M", 0.8));
        let engine =
            TradingEngine::new(&config, gateway, repo, vec![strategy.clone()]).expect("engine");

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.get_status().await.risk_level, RiskLevel::Unknown);
    }

    #[tokio::test]
    async fn test_unknown_risk_blocks_when_configured() {
        let mut config = AppConfig::default();
        config.risk.block_on_unknown = true;
        let repo = Arc::new(positions_unavailable_repository());
        let gateway = Arc::new(PaperGateway::new(repo.clone(), vec![market("M", dec!(0.40))]));
        let strategy = Arc::new(FixedStrategy::new("fixed", "M", 0.8));
        let engine =
            TradingEngine::new(&config, gateway, repo, vec![strategy.clone()]).expect("engine");

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(
            report.outcome,
            CycleOutcome::RiskBlocked {
                level: RiskLevel::Unknown
            }
        );
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_risk_report_leaves_risk_level_alone() {
        let config = AppConfig::default();
        let (engine, repo) = paper_engine(&config, Vec::new());
        repo.update_position("X", 20000, dec!(0.40))
            .await
            .expect("seed");

        let report = engine.risk_report().await.expect("report");
        assert_eq!(report.risk_level, RiskLevel::Critical);
        assert_eq!(engine.get_status().await.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_stalled_scorer_does_not_hang_cycle() {
        let mut config = AppConfig::default();
        config.engine.collaborator_timeout_secs = 1;
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_news_article(&NewsArticle {
            title: "Market rally lifts sentiment".to_string(),
            content: None,
            source: None,
            url: None,
            published_at: Utc::now(),
            sentiment_score: None,
            relevance_score: Some(0.9),
        })
        .await
        .expect("news");
        let gateway = Arc::new(PaperGateway::new(
            repo.clone(),
            vec![market("M", dec!(0.40)), market("N", dec!(0.55))],
        ));
        let sentiment: Arc<dyn SignalStrategy> = Arc::new(SentimentStrategy::new(
            repo.clone(),
            Arc::new(StalledScorer),
            SentimentConfig::default(),
        ));
        let engine = TradingEngine::new(
            &config,
            gateway,
            repo.clone(),
            vec![sentiment, Arc::new(FixedStrategy::new("fixed", "N", 0.8))],
        )
        .expect("engine");

        let report = tokio::time::timeout(Duration::from_secs(5), engine.run_cycle())
            .await
            .expect("cycle bounded by the collaborator timeout")
            .expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.trades.len(), 1);
        assert!(repo.position("N").is_some());

        let status = engine.get_status().await;
        let stalled = status
            .strategies
            .iter()
            .find(|s| s.name == "sentiment")
            .expect("sentiment status");
        assert_eq!(stalled.error_count, 1);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn test_failing_strategy_is_isolated() {
        let config = AppConfig::default();
        let (engine, repo) = paper_engine(
            &config,
            vec![
                Arc::new(FailingStrategy),
                Arc::new(FixedStrategy::new("fixed", "N", 0.8)),
            ],
        );

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.trades.len(), 1);
        assert!(repo.position("N").is_some());

        let status = engine.get_status().await;
        let failing = status
            .strategies
            .iter()
            .find(|s| s.name == "failing")
            .expect("failing status");
        assert_eq!(failing.error_count, 1);
        assert_eq!(status.error_count, 0);
    }

    #[tokio::test]
    async fn test_weights_and_config_disable() {
        let mut config = AppConfig::default();
        config.strategies.insert(
            "muted".to_string(),
            StrategySettings {
                enabled: false,
                weight: None,
            },
        );
        let muted = Arc::new(FixedStrategy::new("muted", "M", 0.9));
        let (engine, _repo) = paper_engine(
            &config,
            vec![muted.clone(), Arc::new(FixedStrategy::new("fixed", "N", 0.8))],
        );

        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(muted.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.signals_generated, 1);

        engine.enable_strategy("muted").expect("enable");
        let report = engine.run_cycle().await.expect("cycle");
        assert_eq!(muted.calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.signals_generated, 2);

        assert!(engine.disable_strategy("missing").is_err());
    }

    #[tokio::test]
    async fn test_start_fails_when_gateway_unreachable() {
        let config = AppConfig::default();
        let repo = Arc::new(InMemoryRepository::new());
        let mut gateway = MockMarketGateway::new();
        gateway.expect_kind().return_const(ExchangeKind::Kalshi);
        gateway
            .expect_ping()
            .returning(|| Err(AugurError::MarketDataUnavailable("connection refused".to_string())));

        let engine =
            TradingEngine::new(&config, Arc::new(gateway), repo, Vec::new()).expect("engine");
        let err = engine.start().await.expect_err("preflight");
        assert!(matches!(err, AugurError::ComponentFailure { .. }));
        assert_eq!(engine.state().await, EngineState::Stopped);
        assert_eq!(engine.stop().await, ShutdownOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_sync_failure_is_a_cycle_error() {
        let config = AppConfig::default();
        let repo = Arc::new(InMemoryRepository::new());
        let mut gateway = MockMarketGateway::new();
        gateway
            .expect_sync_market_data()
            .returning(|| Err(AugurError::MarketDataUnavailable("timeout".to_string())));

        let engine =
            TradingEngine::new(&config, Arc::new(gateway), repo, Vec::new()).expect("engine");
        assert!(engine.run_cycle().await.is_err());
    }
}
