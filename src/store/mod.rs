//! Persistence for tasks and generation records
//!
//! The services talk to the ports in [`ports`]; [`memory`] backs tests and
//! `--in-memory` runs, [`postgres`] backs production.

pub mod memory;
pub mod ports;
pub mod postgres;

pub use memory::InMemoryStore;
pub use ports::{GenerationRepository, StoreError, StoreResult, TaskRepository};
pub use postgres::PostgresStore;
