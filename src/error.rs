use thiserror::Error;

/// Errors produced by the indexer, the poller and the stores they share.
///
/// The variants follow how the caller is expected to react:
/// - `RpcUnavailable`, `StorageUnavailable` and `MalformedLog` put the indexer
///   into recovery (backoff, then rescan from the durable checkpoint)
/// - `CallReverted` and `InvalidAddress` are local to one account and only logged
/// - `InvalidRange` is a programming error on the caller side
/// - `ConfigMissing` only happens at startup and is fatal
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC unavailable: {0}")]
    RpcUnavailable(String),

    #[error("invalid block range: {from} > {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("contract call reverted: {0}")]
    CallReverted(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("missing or invalid configuration: {0}")]
    ConfigMissing(String),

    #[error("malformed log at block {block_number}: {reason}")]
    MalformedLog { block_number: u64, reason: String },

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub type Result<T, E = IndexerError> = std::result::Result<T, E>;

impl IndexerError {
    /// Whether the indexer should back off and retry instead of giving up.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IndexerError::RpcUnavailable(_)
                | IndexerError::StorageUnavailable(_)
                | IndexerError::MalformedLog { .. }
        )
    }
}

impl From<tokio_postgres::Error> for IndexerError {
    fn from(e: tokio_postgres::Error) -> Self {
        IndexerError::StorageUnavailable(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for IndexerError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        IndexerError::StorageUnavailable(e.to_string())
    }
}

impl From<config::ConfigError> for IndexerError {
    fn from(e: config::ConfigError) -> Self {
        IndexerError::ConfigMissing(e.to_string())
    }
}
