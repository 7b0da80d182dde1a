//! Read-only boundary to the chain node.
//!
//! [`ChainClient`] is the only way the indexer and the poller talk to the node,
//! which lets tests swap in a scripted client. Implementations do not retry:
//! the caller decides whether a retried range may advance the checkpoint.

mod rpc;
mod subscription;

use alloy::{
    primitives::{Address, Bytes, B256},
    sol_types::SolCall,
};
use async_trait::async_trait;

use crate::error::{IndexerError, Result};

pub use rpc::AlloyChainClient;
pub use subscription::{LogSubscription, SubscriptionFeed};

/// A contract log as seen by the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl LogEntry {
    /// Position of the log in the chain, used to process logs in emission order.
    pub fn position(&self) -> (u64, u64, u64) {
        (self.block_number, self.transaction_index, self.log_index)
    }
}

/// Emitting contract and event selector (topic0) to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub event_signature: B256,
}

impl LogFilter {
    pub fn new(address: Address, event_signature: B256) -> Self {
        Self {
            address,
            event_signature,
        }
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block number known to the node.
    async fn current_height(&self) -> Result<u64>;

    /// All logs matching `filter` in the inclusive range `[from_block, to_block]`.
    ///
    /// Implementations page the range to whatever width the node accepts.
    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>>;

    /// Starts delivering new matching logs from the chain head.
    ///
    /// The subscription yields at most one error, after which it is dead and
    /// must be re-established by the caller.
    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription>;

    /// Executes a read-only `eth_call` and returns the raw return data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// Performs a typed read call against `address` and decodes its return value.
pub async fn read_contract<C: SolCall>(
    client: &dyn ChainClient,
    address: Address,
    call: &C,
) -> Result<C::Return> {
    let output = client.call(address, call.abi_encode().into()).await?;

    C::abi_decode_returns(&output).map_err(|e| {
        IndexerError::CallReverted(format!(
            "{} returned undecodable data: {}",
            C::SIGNATURE,
            e
        ))
    })
}

/// Rejects inverted ranges before they reach the node.
pub fn check_range(from_block: u64, to_block: u64) -> Result<()> {
    if from_block > to_block {
        return Err(IndexerError::InvalidRange {
            from: from_block,
            to: to_block,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range(5, 5).is_ok());
        assert!(check_range(1, 2000).is_ok());
        assert!(matches!(
            check_range(6, 5),
            Err(IndexerError::InvalidRange { from: 6, to: 5 })
        ));
    }

    #[test]
    fn test_log_position_orders_by_block_then_tx_then_index() {
        let log = |block, tx, index| LogEntry {
            address: Address::ZERO,
            topics: vec![],
            data: Bytes::new(),
            block_number: block,
            transaction_index: tx,
            log_index: index,
        };

        let mut logs = vec![log(10, 2, 0), log(9, 5, 3), log(10, 0, 7), log(10, 0, 1)];
        logs.sort_by_key(LogEntry::position);

        let positions: Vec<_> = logs.iter().map(LogEntry::position).collect();
        assert_eq!(
            positions,
            vec![(9, 5, 3), (10, 0, 1), (10, 0, 7), (10, 2, 0)]
        );
    }
}
