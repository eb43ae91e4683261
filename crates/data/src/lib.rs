//! Durable persistence for the bot fleet: configs, positions, trade history,
//! per-bot statistics and the coin blacklist.

pub mod database;
pub mod error;
pub mod rows;

pub use database::DatabaseClient;
pub use error::PersistenceError;
