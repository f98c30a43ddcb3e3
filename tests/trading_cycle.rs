//! Full trading cycles against the in-memory repository and paper gateway

use async_trait::async_trait;
use augur::adapters::InMemoryRepository;
use augur::config::{AppConfig, StrategySettings};
use augur::coordinator::{CycleOutcome, EngineState, PerformanceTracker, ShutdownOutcome};
use augur::domain::{Market, MarketSnapshot, MarketStatus, Signal, SignalDirection};
use augur::error::Result;
use augur::exchange::{MarketGateway, PaperGateway};
use augur::persistence::Repository;
use augur::strategy::strategies::{StatArbConfig, StatisticalArbitrageStrategy};
use augur::strategy::SignalStrategy;
use augur::TradingEngine;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

fn market(id: &str, title: &str, category: Option<&str>, yes: Decimal) -> Market {
    Market {
        id: id.to_string(),
        title: title.to_string(),
        subtitle: None,
        category: category.map(str::to_string),
        status: MarketStatus::Active,
        yes_price: yes,
        no_price: Decimal::ONE - yes,
        volume: dec!(1000),
        open_interest: Decimal::ZERO,
        close_time: None,
        updated_at: Utc::now(),
    }
}

/// Emits one signal per (market, confidence) pair
struct ScriptedStrategy {
    name: &'static str,
    direction: SignalDirection,
    picks: Vec<(&'static str, f64)>,
    delay: Duration,
    entered: Arc<Notify>,
    calls: AtomicUsize,
}

impl ScriptedStrategy {
    fn buying(name: &'static str, picks: Vec<(&'static str, f64)>) -> Self {
        Self {
            name,
            direction: SignalDirection::Buy,
            picks,
            delay: Duration::ZERO,
            entered: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SignalStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn generate_signals(&self, _snapshot: &MarketSnapshot) -> Result<Vec<Signal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self
            .picks
            .iter()
            .map(|(market_id, confidence)| {
                Signal::new(*market_id, self.direction, *confidence, dec!(0.05))
            })
            .collect())
    }
}

struct Harness {
    engine: TradingEngine,
    repo: Arc<InMemoryRepository>,
    gateway: Arc<PaperGateway>,
}

fn harness(config: &AppConfig, markets: Vec<Market>, strategies: Vec<Arc<dyn SignalStrategy>>) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let gateway = Arc::new(PaperGateway::new(repo.clone(), markets));
    let engine =
        TradingEngine::new(config, gateway.clone(), repo.clone(), strategies).expect("engine");
    Harness {
        engine,
        repo,
        gateway,
    }
}

#[tokio::test]
async fn buy_signal_becomes_position_and_is_marked() {
    let config = AppConfig::default();
    let h = harness(
        &config,
        vec![market("FED-CUT", "Fed cuts in June", Some("Economics"), dec!(0.40))],
        vec![Arc::new(ScriptedStrategy::buying("scripted", vec![("FED-CUT", 0.8)]))],
    );

    let report = h.engine.run_cycle().await.expect("cycle");
    assert_eq!(report.outcome, CycleOutcome::Completed);
    assert_eq!(report.pipeline.accepted, 1);
    assert_eq!(report.trades.len(), 1);

    let trade = &report.trades[0].trade;
    assert_eq!(trade.quantity, 1250);
    assert_eq!(trade.price, dec!(0.40));
    assert_eq!(trade.total_cost, dec!(500));
    assert!(trade.simulated);

    let position = h.repo.position("FED-CUT").expect("position");
    assert_eq!(position.quantity, 1250);

    let signals = h.repo.signals().await;
    assert_eq!(signals.len(), 1);
    assert!(signals[0].executed);

    // Quote moves up ten cents; next sync re-marks the position
    h.gateway
        .set_quote("FED-CUT", dec!(0.50), dec!(0.50))
        .await
        .expect("quote");
    assert!(h.gateway.sync_market_data().await.expect("sync"));

    let snapshot = PerformanceTracker::new(h.repo.clone(), config.trading.bankroll)
        .snapshot()
        .await
        .expect("snapshot");
    assert_eq!(snapshot.total_value, dec!(10125));
    assert_eq!(snapshot.cumulative_pnl, dec!(125));
}

#[tokio::test]
async fn same_market_from_two_strategies_trades_once() {
    let mut config = AppConfig::default();
    config.strategies.insert(
        "second".to_string(),
        StrategySettings {
            enabled: true,
            weight: Some(2.0),
        },
    );
    let h = harness(
        &config,
        vec![market("M", "Market M", None, dec!(0.40))],
        vec![
            Arc::new(ScriptedStrategy::buying("first", vec![("M", 0.7)])),
            Arc::new(ScriptedStrategy::buying("second", vec![("M", 0.9)])),
        ],
    );

    let report = h.engine.run_cycle().await.expect("cycle");
    assert_eq!(report.signals_generated, 2);
    assert_eq!(report.pipeline.duplicates, 1);
    assert_eq!(report.trades.len(), 1);
    // 0.9 x 2.0 outranks 0.7 x 1.0
    assert_eq!(report.trades[0].trade.strategy, "second");
    assert_eq!(h.repo.trades().await.len(), 1);
}

#[tokio::test]
async fn equally_weighted_duplicates_keep_registration_order() {
    let config = AppConfig::default();
    let h = harness(
        &config,
        vec![market("M", "Market M", None, dec!(0.40))],
        vec![
            Arc::new(ScriptedStrategy::buying("first", vec![("M", 0.6)])),
            Arc::new(ScriptedStrategy::buying("second", vec![("M", 0.9)])),
        ],
    );

    let report = h.engine.run_cycle().await.expect("cycle");
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].trade.strategy, "first");
}

#[tokio::test]
async fn cycle_is_capped_to_highest_confidence_signals() {
    let config = AppConfig::default();
    let ids = ["A", "B", "C", "D", "E", "F", "G"];
    let markets = ids
        .iter()
        .map(|id| market(id, &format!("Market {id}"), None, dec!(0.50)))
        .collect();
    let picks = vec![
        ("A", 0.61),
        ("B", 0.95),
        ("C", 0.70),
        ("D", 0.90),
        ("E", 0.65),
        ("F", 0.85),
        ("G", 0.80),
    ];
    let h = harness(
        &config,
        markets,
        vec![Arc::new(ScriptedStrategy::buying("scripted", picks))],
    );

    let report = h.engine.run_cycle().await.expect("cycle");
    assert_eq!(report.pipeline.capped, 2);
    let traded: Vec<&str> = report
        .trades
        .iter()
        .map(|t| t.trade.market_id.as_str())
        .collect();
    assert_eq!(traded, vec!["B", "D", "F", "G", "C"]);
}

#[tokio::test]
async fn probability_arbitrage_sells_overpriced_outcomes() {
    let config = AppConfig::default();
    let repo = Arc::new(InMemoryRepository::new());
    let gateway = Arc::new(PaperGateway::new(
        repo.clone(),
        vec![
            market("ELEC-A", "Election winner: A", Some("Politics"), dec!(0.60)),
            market("ELEC-B", "Election winner: B", Some("Politics"), dec!(0.50)),
            market("ELEC-C", "Election winner: C", Some("Politics"), dec!(0.30)),
        ],
    ));
    let stat_arb: Arc<dyn SignalStrategy> = Arc::new(StatisticalArbitrageStrategy::new(
        repo.clone(),
        StatArbConfig::default(),
    ));
    let engine = TradingEngine::new(&config, gateway, repo.clone(), vec![stat_arb]).expect("engine");

    let report = engine.run_cycle().await.expect("cycle");
    assert_eq!(report.trades.len(), 2);

    // Sells fill at the no price: 300 notional / 0.40 and / 0.50
    assert_eq!(repo.position("ELEC-A").expect("A").quantity, -750);
    assert_eq!(repo.position("ELEC-B").expect("B").quantity, -600);
    assert!(repo.position("ELEC-C").is_none());
}

#[tokio::test]
async fn stop_during_cycle_waits_for_it() {
    let config = AppConfig::default();
    let mut strategy = ScriptedStrategy::buying("slow", vec![("M", 0.8)]);
    strategy.delay = Duration::from_millis(250);
    let strategy = Arc::new(strategy);
    let entered = strategy.entered.clone();
    let h = harness(
        &config,
        vec![market("M", "Market M", None, dec!(0.40))],
        vec![strategy.clone()],
    );

    h.engine.start().await.expect("start");
    entered.notified().await;

    let started = Instant::now();
    assert_eq!(h.engine.stop().await, ShutdownOutcome::Clean);
    assert!(started.elapsed() < Duration::from_secs(5));

    let status = h.engine.get_status().await;
    assert_eq!(status.state, EngineState::Stopped);
    assert_eq!(status.execution_count, 1);
    assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.repo.position("M").expect("position").quantity, 1250);
    // The loop records a snapshot after the cycle before it sees the stop
    assert_eq!(h.repo.snapshots().await.len(), 1);
}

#[tokio::test]
async fn risk_report_reflects_open_positions() {
    let config = AppConfig::default();
    let h = harness(
        &config,
        vec![market("M", "Market M", None, dec!(0.40))],
        vec![Arc::new(ScriptedStrategy::buying("scripted", vec![("M", 0.8)]))],
    );
    h.engine.run_cycle().await.expect("cycle");

    let report = h.engine.risk_report().await.expect("report");
    assert_eq!(report.position_count, 1);
    assert_eq!(report.position_risks[0].market_id, "M");
    assert!((report.portfolio_metrics.total_exposure - 0.05).abs() < 1e-9);

    let positions = h.repo.get_active_positions().await.expect("positions");
    assert_eq!(positions.len(), 1);
}
