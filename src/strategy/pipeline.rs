//! Signal pipeline
//!
//! Turns the aggregated output of every strategy into the executable set for
//! one cycle, in order: validity filter, risk-gated sizing, deduplication,
//! ranking by `confidence x weight`, and the per-cycle cap.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::validation::ValidationChain;
use crate::config::AppConfig;
use crate::domain::{Market, SignalDirection, WeightedSignal};
use crate::error::SignalRejection;
use crate::persistence::Repository;
use crate::risk::PortfolioRiskEngine;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bankroll: Decimal,
    pub min_confidence: f64,
    pub max_signals: usize,
    /// Resize disallowed signals to a positive recommendation instead of dropping them
    pub allow_downsizing: bool,
    pub call_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bankroll: config.trading.bankroll,
            min_confidence: config.trading.min_confidence,
            max_signals: config.trading.max_signals_per_cycle,
            allow_downsizing: config.risk.allow_downsizing,
            call_timeout: config.engine.collaborator_timeout(),
        }
    }
}

/// Counts per stage for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub received: usize,
    pub invalid: usize,
    pub risk_rejected: usize,
    pub resized: usize,
    pub duplicates: usize,
    pub capped: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub signals: Vec<WeightedSignal>,
    pub report: PipelineReport,
}

pub struct SignalPipeline {
    config: PipelineConfig,
    repository: Arc<dyn Repository>,
    risk: Arc<PortfolioRiskEngine>,
    chain: ValidationChain,
}

impl SignalPipeline {
    pub fn new(
        config: PipelineConfig,
        repository: Arc<dyn Repository>,
        risk: Arc<PortfolioRiskEngine>,
    ) -> Self {
        let chain = ValidationChain::executable(config.min_confidence);
        Self {
            config,
            repository,
            risk,
            chain,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages. Rejections are logged and counted, never raised.
    pub async fn process(&self, signals: Vec<WeightedSignal>) -> PipelineOutput {
        let mut report = PipelineReport {
            received: signals.len(),
            ..PipelineReport::default()
        };

        let mut markets: HashMap<String, Option<Market>> = HashMap::new();
        let mut valid = Vec::with_capacity(signals.len());
        for weighted in signals {
            match self.check_validity(&weighted, &mut markets).await {
                Ok(()) => valid.push(weighted),
                Err(reason) => {
                    report.invalid += 1;
                    debug!(
                        market_id = %weighted.signal.market_id,
                        strategy = %weighted.signal.strategy,
                        %reason,
                        "signal dropped"
                    );
                }
            }
        }

        let mut sized = Vec::with_capacity(valid.len());
        for mut weighted in valid {
            match self.apply_risk_sizing(&mut weighted).await {
                Ok(resized) => {
                    if resized {
                        report.resized += 1;
                    }
                    sized.push(weighted);
                }
                Err(reason) => {
                    report.risk_rejected += 1;
                    debug!(
                        market_id = %weighted.signal.market_id,
                        strategy = %weighted.signal.strategy,
                        %reason,
                        "signal rejected by risk"
                    );
                }
            }
        }

        let before_dedup = sized.len();
        let deduped = dedup_signals(sized);
        report.duplicates = before_dedup - deduped.len();

        let ranked = rank_signals(deduped);
        let before_cap = ranked.len();
        let capped = cap_signals(ranked, self.config.max_signals);
        report.capped = before_cap - capped.len();
        report.accepted = capped.len();

        info!(
            "Pipeline: {} received, {} invalid, {} risk-rejected, {} resized, {} duplicates, {} capped, {} accepted",
            report.received,
            report.invalid,
            report.risk_rejected,
            report.resized,
            report.duplicates,
            report.capped,
            report.accepted
        );

        PipelineOutput {
            signals: capped,
            report,
        }
    }

    async fn check_validity(
        &self,
        weighted: &WeightedSignal,
        markets: &mut HashMap<String, Option<Market>>,
    ) -> Result<(), SignalRejection> {
        let signal = &weighted.signal;
        self.chain.validate(signal)?;

        if !markets.contains_key(&signal.market_id) {
            let lookup = tokio::time::timeout(
                self.config.call_timeout,
                self.repository.get_market(&signal.market_id),
            )
            .await
            .map_err(|_| SignalRejection::Lookup(format!("get_market {} timed out", signal.market_id)))?
            .map_err(|e| SignalRejection::Lookup(e.to_string()))?;
            markets.insert(signal.market_id.clone(), lookup);
        }

        match markets.get(&signal.market_id) {
            Some(Some(market)) if market.is_active() => Ok(()),
            Some(Some(_)) => Err(SignalRejection::InactiveMarket(signal.market_id.clone())),
            _ => Err(SignalRejection::UnknownMarket(signal.market_id.clone())),
        }
    }

    /// Returns whether the signal was resized
    async fn apply_risk_sizing(&self, weighted: &mut WeightedSignal) -> Result<bool, SignalRejection> {
        let bankroll = self.config.bankroll;
        let signal = &mut weighted.signal;
        let proposed = signal.size_fraction * bankroll;

        let check = self
            .risk
            .check_position_limits(&signal.market_id, proposed)
            .await
            .map_err(|e| SignalRejection::Lookup(e.to_string()))?;

        if !check.allowed {
            let salvageable = self.config.allow_downsizing && check.recommended_size > Decimal::ZERO;
            if !salvageable {
                return Err(SignalRejection::RiskLimits(check.summary()));
            }
        }

        if check.recommended_size < proposed {
            let original = signal.size_fraction;
            signal.size_fraction = check.recommended_size / bankroll;
            signal
                .features
                .insert("original_size_fraction".to_string(), original.to_string().into());
            debug!(
                market_id = %signal.market_id,
                %original,
                resized = %signal.size_fraction,
                "signal resized by risk limits"
            );
            return Ok(true);
        }
        Ok(false)
    }
}

// ==================== Pure stages ====================

/// One signal per (market, direction), in first-seen order.
///
/// Among equally weighted duplicates the first occurrence wins. A later
/// duplicate from a differently weighted strategy replaces the kept one only
/// when its `confidence x weight` is strictly higher.
pub fn dedup_signals(signals: Vec<WeightedSignal>) -> Vec<WeightedSignal> {
    let mut slots: HashMap<(String, SignalDirection), usize> = HashMap::new();
    let mut kept: Vec<WeightedSignal> = Vec::with_capacity(signals.len());
    for candidate in signals {
        let key = (candidate.signal.market_id.clone(), candidate.signal.direction);
        match slots.get(&key) {
            Some(&slot) => {
                let current = &kept[slot];
                if candidate.weight != current.weight && candidate.score() > current.score() {
                    kept[slot] = candidate;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(candidate);
            }
        }
    }
    kept
}

/// Stable sort by `confidence x weight`, highest first
pub fn rank_signals(mut signals: Vec<WeightedSignal>) -> Vec<WeightedSignal> {
    signals.sort_by(|a, b| b.score().total_cmp(&a.score()));
    signals
}

pub fn cap_signals(mut signals: Vec<WeightedSignal>, max: usize) -> Vec<WeightedSignal> {
    signals.truncate(max);
    signals
}
