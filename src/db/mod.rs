use std::sync::Arc;

use log::info;

use crate::config::PostgresSettings;

pub mod models;
pub mod postgres;
mod store;

pub use postgres::PostgresClient;
pub use store::{AccountStore, BalanceStore, CheckpointStore, Insertion};

/// Relational store shared by the indexer, the margin poller and the HTTP API.
///
/// PostgreSQL holds every table (checkpoints, accounts, balance history), so
/// the three store traits are all served by the same pooled client.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings).await?;

        // Run migrations
        postgres.migrate().await?;

        info!("Database ready");

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.postgres.clone()
    }

    pub fn accounts(&self) -> Arc<dyn AccountStore> {
        self.postgres.clone()
    }

    pub fn balances(&self) -> Arc<dyn BalanceStore> {
        self.postgres.clone()
    }
}
