pub mod paper;
mod traits;

pub use paper::PaperGateway;
pub use traits::{parse_exchange_kind, ExchangeKind, MarketGateway};

#[cfg(test)]
pub use traits::MockMarketGateway;
