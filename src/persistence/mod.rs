//! Persistence layer
//!
//! The engine only talks to storage through [`Repository`]. Two implementations
//! live under `adapters`: an in-memory store for paper trading and tests, and a
//! PostgreSQL store for unattended runs.

pub mod repository;

pub use repository::Repository;

#[cfg(test)]
pub use repository::MockRepository;
