use alloy::primitives::{Address, I256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::hex_encode;

/// Point-in-time margin of an account on one balance source contract (PostgreSQL).
///
/// Population: indexer on account discovery, margin poller every cycle.
///
/// Query Patterns:
///   - "Latest margin of account X" (optionally for contract Y)
///   - "Margin history of account X, oldest first"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub id: i64,
    pub account_id: i64,
    pub contract_address: String,
    /// Signed 256-bit integer in decimal notation
    pub balance: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot to append, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBalanceSnapshot {
    pub account_id: i64,
    pub contract_address: String,
    pub balance: String,
    pub timestamp: DateTime<Utc>,
}

impl NewBalanceSnapshot {
    pub fn new(account_id: i64, contract: Address, balance: I256) -> Self {
        Self::at(account_id, contract, balance, Utc::now())
    }

    pub fn at(account_id: i64, contract: Address, balance: I256, timestamp: DateTime<Utc>) -> Self {
        Self {
            account_id,
            contract_address: hex_encode(contract.as_slice()),
            balance: balance.to_string(),
            timestamp,
        }
    }
}
