pub mod kalshi_rest;
pub mod memory;
pub mod postgres;

pub use kalshi_rest::KalshiGateway;
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
