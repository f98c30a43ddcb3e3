pub mod market;
pub mod order;
pub mod performance;
pub mod position;
pub mod risk;
pub mod signal;

pub use market::*;
pub use order::*;
pub use performance::*;
pub use position::*;
pub use risk::*;
pub use signal::*;
