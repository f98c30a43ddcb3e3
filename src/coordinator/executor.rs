//! Signal execution
//!
//! Turns one ranked signal into a committed trade. Every failure is scoped to
//! the signal being executed; the caller moves on to the next one.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::state::ExecutedTrade;
use crate::domain::{NewTrade, Position, Signal, Trade};
use uuid::Uuid;
use crate::error::{ExecutionError, Result};
use crate::exchange::MarketGateway;
use crate::persistence::Repository;

pub struct TradeExecutor {
    repository: Arc<dyn Repository>,
    gateway: Arc<dyn MarketGateway>,
    bankroll: Decimal,
    dry_run: bool,
    call_timeout: Duration,
}

impl TradeExecutor {
    pub fn new(
        repository: Arc<dyn Repository>,
        gateway: Arc<dyn MarketGateway>,
        bankroll: Decimal,
        dry_run: bool,
        call_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            bankroll,
            dry_run,
            call_timeout,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> std::result::Result<Result<T>, ExecutionError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| ExecutionError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.call_timeout.as_millis() as u64,
            })
    }

    /// Price, size, persist and commit one signal.
    ///
    /// The signal is recorded before the order goes out and marked executed
    /// only once the trade and position update have both been committed.
    pub async fn execute(&self, signal: &Signal) -> std::result::Result<ExecutedTrade, ExecutionError> {
        let market_id = signal.market_id.as_str();

        let market = self
            .bounded("get_market", self.gateway.get_market(market_id))
            .await?
            .map_err(|e| ExecutionError::MarketLookup(e.to_string()))?;
        let price = market
            .price_for(signal.direction)
            .ok_or_else(|| ExecutionError::InvalidPrice {
                market_id: market_id.to_string(),
                price: Decimal::ZERO,
            })?;
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return Err(ExecutionError::InvalidPrice {
                market_id: market_id.to_string(),
                price,
            });
        }

        let notional = signal.size_fraction * self.bankroll;
        let quantity = order_quantity(notional, price)?;

        let record = self
            .bounded("record_trading_signal", self.repository.record_trading_signal(signal))
            .await?
            .map_err(|e| ExecutionError::Persistence(e.to_string()))?;

        let (order_id, filled, fill_price) = if self.dry_run {
            (None, quantity, price)
        } else {
            let (order_id, filled, fill_price) = self.place(signal, quantity, price).await?;
            (Some(order_id), filled, fill_price)
        };

        let new_trade = NewTrade {
            market_id: market_id.to_string(),
            strategy: signal.strategy.clone(),
            direction: signal.direction,
            quantity: filled,
            price: fill_price,
            confidence: signal.confidence,
            simulated: self.dry_run,
        };

        let (trade, position) = match self.commit(&new_trade, record.id).await {
            Ok(committed) => committed,
            Err(e) => {
                // The exchange holds a fill the repository does not know about
                if let Some(order_id) = &order_id {
                    error!(
                        %order_id,
                        %market_id,
                        filled,
                        %fill_price,
                        signal_id = %record.id,
                        error = %e,
                        "Filled order was not recorded; position needs reconciliation"
                    );
                }
                return Err(e);
            }
        };

        info!(
            "{} trade executed: {} {} of {} at {:.3} (total: ${:.2})",
            if self.dry_run { "Simulated" } else { "Live" },
            signal.direction,
            filled,
            market_id,
            fill_price,
            trade.total_cost
        );

        Ok(ExecutedTrade {
            signal_id: record.id,
            trade,
            position,
        })
    }

    /// Trade row, position update, then the executed flag
    async fn commit(
        &self,
        new_trade: &NewTrade,
        signal_id: Uuid,
    ) -> std::result::Result<(Trade, Option<Position>), ExecutionError> {
        let trade = self
            .bounded("record_trade", self.repository.record_trade(new_trade))
            .await?
            .map_err(|e| ExecutionError::Persistence(e.to_string()))?;
        let position = self
            .bounded(
                "update_position",
                self.repository.update_position(
                    &new_trade.market_id,
                    new_trade.position_delta(),
                    new_trade.price,
                ),
            )
            .await?
            .map_err(|e| ExecutionError::Persistence(e.to_string()))?;
        self.bounded("mark_signal_executed", self.repository.mark_signal_executed(signal_id))
            .await?
            .map_err(|e| ExecutionError::Persistence(e.to_string()))?;
        Ok((trade, position))
    }

    /// Send a market order; returns the order id, filled quantity and fill price
    async fn place(
        &self,
        signal: &Signal,
        quantity: i64,
        quote: Decimal,
    ) -> std::result::Result<(String, i64, Decimal), ExecutionError> {
        let result = self
            .bounded(
                "place_order",
                self.gateway
                    .place_order(&signal.market_id, signal.direction, quantity, None),
            )
            .await?
            .map_err(|e| ExecutionError::Order(e.to_string()))?;

        if !result.has_fill() {
            match self
                .bounded("cancel_order", self.gateway.cancel_order(&result.order_id))
                .await
            {
                Ok(Ok(())) => debug!(order_id = %result.order_id, "unfilled order cancelled"),
                Ok(Err(e)) => warn!(order_id = %result.order_id, error = %e, "cancel failed"),
                Err(e) => warn!(order_id = %result.order_id, error = %e, "cancel timed out"),
            }
            return Err(ExecutionError::Unfilled {
                order_id: result.order_id,
            });
        }

        let fill_price = result.avg_fill_price.unwrap_or(quote);
        Ok((result.order_id, result.filled_quantity, fill_price))
    }
}

/// Whole contracts affordable with `notional` at `price`
pub fn order_quantity(notional: Decimal, price: Decimal) -> std::result::Result<i64, ExecutionError> {
    let zero = || ExecutionError::ZeroQuantity { notional, price };
    if price <= Decimal::ZERO {
        return Err(zero());
    }
    let quantity = (notional / price).floor().to_i64().ok_or_else(zero)?;
    if quantity <= 0 {
        return Err(zero());
    }
    Ok(quantity)
}
