use std::time::Duration;

use alloy::primitives::Address;
use config::{Config, Environment, File};
use log::LevelFilter;
use serde::Deserialize;
use url::Url;

use crate::error::{IndexerError, Result};

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Discovered accounts
/// - Balance history snapshots
/// - Indexer checkpoints
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Backfill-and-follow indexer tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    /// Widest block range sent in a single `eth_getLogs` request
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// Blocks replayed before the checkpoint is persisted during backfill
    #[serde(default = "default_backfill_window_blocks")]
    pub backfill_window_blocks: u64,
    #[serde(default = "default_recovery_backoff_secs")]
    pub recovery_backoff_secs: u64,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    /// Filter polling interval when no WebSocket endpoint is configured
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_backfill_window_blocks() -> u64 {
    10_000
}

fn default_recovery_backoff_secs() -> u64 {
    5
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_millis() -> u64 {
    2_000
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            max_block_range: default_max_block_range(),
            backfill_window_blocks: default_backfill_window_blocks(),
            recovery_backoff_secs: default_recovery_backoff_secs(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
            poll_interval_millis: default_poll_interval_millis(),
        }
    }
}

impl IndexerSettings {
    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_secs(self.recovery_backoff_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

/// Margin poller schedule.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    /// Interval between full polling cycles - default 1 hour
    #[serde(default = "default_poller_interval_secs")]
    pub interval_secs: u64,
    /// Delay before retrying a cycle that failed as a whole - default 1 minute
    #[serde(default = "default_poller_retry_secs")]
    pub retry_secs: u64,
}

fn default_poller_interval_secs() -> u64 {
    3_600
}

fn default_poller_retry_secs() -> u64 {
    60
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poller_interval_secs(),
            retry_secs: default_poller_retry_secs(),
        }
    }
}

/// Root application configuration.
///
/// Read from an optional `config.{yaml,toml,json}` file, then overridden by
/// environment variables. Nested keys use `__` as separator, e.g.
/// `POSTGRES__HOST` or `INDEXER__MAX_BLOCK_RANGE`.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc_url: String,
    /// WebSocket endpoint for push subscriptions; filter polling is used without it
    #[serde(default)]
    pub ws_url: Option<String>,
    pub factory_address: Address,
    pub margin_contract_address: Address,
    /// Block the factory was deployed at, seeds the first checkpoint
    pub deployed_block: u64,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_checkpoint_name")]
    pub checkpoint_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub poller: PollerSettings,
}

fn default_http_port() -> u16 {
    3000
}

fn default_checkpoint_name() -> String {
    "lastProcessedBlock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(s)
    }

    /// Deserializes and validates an already assembled configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Logger level; `validate` guarantees `log_level` parses.
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.rpc_url)
            .map_err(|e| IndexerError::ConfigMissing(format!("rpc_url: {}", e)))?;

        if let Some(ws_url) = &self.ws_url {
            let url = Url::parse(ws_url)
                .map_err(|e| IndexerError::ConfigMissing(format!("ws_url: {}", e)))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(IndexerError::ConfigMissing(format!(
                    "ws_url: expected ws:// or wss://, got {}",
                    url.scheme()
                )));
            }
        }

        if self.factory_address == Address::ZERO {
            return Err(IndexerError::ConfigMissing(
                "factory_address must not be the zero address".to_string(),
            ));
        }
        if self.margin_contract_address == Address::ZERO {
            return Err(IndexerError::ConfigMissing(
                "margin_contract_address must not be the zero address".to_string(),
            ));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(IndexerError::ConfigMissing(format!(
                "log_level: unknown level {:?}",
                self.log_level
            )));
        }

        if self.indexer.max_block_range == 0 || self.indexer.backfill_window_blocks == 0 {
            return Err(IndexerError::ConfigMissing(
                "indexer block ranges must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = r#"
rpc_url: "https://mainnet.base.org"
factory_address: "0x631658F09a33251A9fA6344223D4673176f5D1A1"
margin_contract_address: "0x0A2AF931eFFd34b81ebcc57E3d3c9B1E1dE1C9Ce"
deployed_block: 17000000
postgres:
  host: "localhost"
  port: 5432
  user: "indexer"
  password: "secret"
  database: "memebank"
"#;

    fn load(yaml: &str) -> Result<Settings> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_defaults_applied() {
        let settings = load(BASE).unwrap();

        assert_eq!(settings.deployed_block, 17_000_000);
        assert_eq!(settings.http_port, 3000);
        assert_eq!(settings.checkpoint_name, "lastProcessedBlock");
        assert!(settings.ws_url.is_none());
        assert_eq!(settings.indexer.max_block_range, 2_000);
        assert_eq!(settings.indexer.recovery_backoff(), Duration::from_secs(5));
        assert_eq!(settings.poller.interval_secs, 3_600);
        assert_eq!(settings.poller.retry_secs, 60);
        assert_eq!(settings.postgres.pool_size, 16);
    }

    #[test]
    fn test_missing_required_key_is_config_missing() {
        let yaml = BASE.replace("deployed_block: 17000000\n", "");
        let err = load(&yaml).unwrap_err();

        assert!(matches!(err, IndexerError::ConfigMissing(_)));
        assert!(err.to_string().contains("deployed_block"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let yaml = BASE.replace(
            "0x631658F09a33251A9fA6344223D4673176f5D1A1",
            "not-an-address",
        );
        assert!(matches!(load(&yaml), Err(IndexerError::ConfigMissing(_))));
    }

    #[test]
    fn test_ws_url_scheme_checked() {
        let yaml = format!("{}ws_url: \"https://mainnet.base.org\"\n", BASE);
        assert!(matches!(load(&yaml), Err(IndexerError::ConfigMissing(_))));

        let yaml = format!("{}ws_url: \"wss://mainnet.base.org\"\n", BASE);
        let settings = load(&yaml).unwrap();
        assert_eq!(settings.ws_url.as_deref(), Some("wss://mainnet.base.org"));
    }

    #[test]
    fn test_log_level_checked() {
        let yaml = format!("{}log_level: \"debug\"\n", BASE);
        assert_eq!(load(&yaml).unwrap().log_level_filter(), LevelFilter::Debug);

        let yaml = format!("{}log_level: \"chatty\"\n", BASE);
        let err = load(&yaml).unwrap_err();
        assert!(matches!(err, IndexerError::ConfigMissing(_)));
        assert!(err.to_string().contains("log_level"));
    }
}
