use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{abis::AccountCreated, utils::hex_encode};

/// Account discovered from an `AccountCreated` factory event (PostgreSQL).
///
/// Addresses are stored lowercase so lookups do not depend on checksum casing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub address: String,
    pub creator: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Account row to insert, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub address: String,
    pub creator: String,
}

impl NewAccount {
    pub fn new(address: Address, creator: Address) -> Self {
        Self {
            address: hex_encode(address.as_slice()),
            creator: hex_encode(creator.as_slice()),
        }
    }

    pub fn from_event(event: &AccountCreated) -> Self {
        Self::new(event.account, event.creator)
    }
}

impl Account {
    /// On-chain address of the account contract.
    pub fn chain_address(&self) -> Option<Address> {
        self.address.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_new_account_lowercases_addresses() {
        let account = NewAccount::from_event(&AccountCreated {
            account: address!("0A2AF931eFFd34b81ebcc57E3d3c9B1E1dE1C9Ce"),
            creator: address!("631658F09a33251A9fA6344223D4673176f5D1A1"),
        });

        assert_eq!(account.address, "0x0a2af931effd34b81ebcc57e3d3c9b1e1de1c9ce");
        assert_eq!(account.creator, "0x631658f09a33251a9fa6344223d4673176f5d1a1");
    }
}
