use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SignalDirection;

/// Net holding in one market. Positive quantity is long yes, negative is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub quantity: i64,
    pub average_price: Decimal,
    pub current_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a fresh position from a first fill
    pub fn open(market_id: impl Into<String>, quantity: i64, price: Decimal) -> Self {
        let now = Utc::now();
        let mut position = Self {
            market_id: market_id.into(),
            quantity,
            average_price: price,
            current_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            opened_at: now,
            updated_at: now,
        };
        position.mark(price);
        position
    }

    pub fn abs_quantity(&self) -> Decimal {
        Decimal::from(self.quantity.unsigned_abs())
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    /// Apply a signed fill. Returns `None` when the position nets to zero.
    ///
    /// Same-direction fills volume-weight the entry price, reducing fills keep it,
    /// and a fill that flips the sign restarts the average at the fill price.
    pub fn apply_fill(mut self, delta: i64, price: Decimal) -> Option<Self> {
        let new_quantity = self.quantity + delta;
        if new_quantity == 0 {
            return None;
        }

        let same_direction = self.quantity.signum() == delta.signum();
        let flipped = self.quantity.signum() != new_quantity.signum();

        let mark_price = if same_direction {
            let old_qty = self.abs_quantity();
            let add_qty = Decimal::from(delta.unsigned_abs());
            self.average_price =
                (old_qty * self.average_price + add_qty * price) / (old_qty + add_qty);
            price
        } else if flipped {
            self.average_price = price;
            self.opened_at = Utc::now();
            price
        } else {
            // Reducing fills are quoted on the opposite side of the book
            Decimal::ONE - price
        };

        self.quantity = new_quantity;
        self.mark(mark_price);
        Some(self)
    }

    /// Re-mark at a side price
    pub fn mark(&mut self, price: Decimal) {
        let qty = self.abs_quantity();
        self.current_value = qty * price;
        self.unrealized_pnl = qty * (price - self.average_price);
        self.updated_at = Utc::now();
    }
}

/// Trade to be recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrade {
    pub market_id: String,
    pub strategy: String,
    pub direction: SignalDirection,
    pub quantity: i64,
    pub price: Decimal,
    pub confidence: f64,
    pub simulated: bool,
}

impl NewTrade {
    pub fn total_cost(&self) -> Decimal {
        Decimal::from(self.quantity) * self.price
    }

    /// Signed delta this trade applies to the position
    pub fn position_delta(&self) -> i64 {
        self.quantity * self.direction.sign()
    }
}

/// A recorded trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub market_id: String,
    pub strategy: String,
    pub direction: SignalDirection,
    pub quantity: i64,
    pub price: Decimal,
    pub total_cost: Decimal,
    pub confidence: f64,
    pub simulated: bool,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn from_new(trade: &NewTrade) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id: trade.market_id.clone(),
            strategy: trade.strategy.clone(),
            direction: trade.direction,
            quantity: trade.quantity,
            price: trade.price,
            total_cost: trade.total_cost(),
            confidence: trade.confidence,
            simulated: trade.simulated,
            executed_at: Utc::now(),
        }
    }
}
