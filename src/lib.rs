pub mod abis;
pub mod api;
pub mod chain;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod testing;

pub use api::AppState;
pub use chain::{AlloyChainClient, ChainClient};
pub use config::Settings;
pub use cron::MarginPoller;
pub use db::Database;
pub use error::{IndexerError, Result};
pub use worker::{AccountIndexer, IndexerOptions, MarginRecorder};
