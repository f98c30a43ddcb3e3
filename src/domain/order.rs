use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order status as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Order accepted, nothing filled yet
    Submitted,
    /// Order partially filled
    PartiallyFilled,
    /// Order fully filled
    Filled,
    /// Order cancelled
    Cancelled,
    /// Order rejected by exchange
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Parse exchange status strings ("executed", "resting", ...)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "filled" | "executed" | "matched" => OrderStatus::Filled,
            "partially_filled" | "partial" => OrderStatus::PartiallyFilled,
            "canceled" | "cancelled" | "expired" => OrderStatus::Cancelled,
            "rejected" | "failed" => OrderStatus::Rejected,
            _ => OrderStatus::Submitted,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Result of placing an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: i64,
    pub avg_fill_price: Option<Decimal>,
}

impl OrderResult {
    pub fn filled(order_id: impl Into<String>, quantity: i64, price: Decimal) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            avg_fill_price: Some(price),
        }
    }

    pub fn has_fill(&self) -> bool {
        self.filled_quantity > 0
    }
}
