#[allow(clippy::module_inception)]
mod config;

pub use config::{IndexerSettings, PollerSettings, PostgresSettings, Settings};
