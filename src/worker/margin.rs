use std::sync::Arc;

use alloy::primitives::{Address, I256};

use crate::{
    abis::IPerpsMarket,
    chain::{read_contract, ChainClient},
    db::{
        models::{Account, BalanceSnapshot, NewBalanceSnapshot},
        BalanceStore,
    },
    error::{IndexerError, Result},
};

/// Reads an account's available margin and appends it to the balance history.
///
/// Shared by the indexer (on account discovery) and the margin poller.
#[derive(Clone)]
pub struct MarginRecorder {
    chain: Arc<dyn ChainClient>,
    balances: Arc<dyn BalanceStore>,
    contract: Address,
}

impl MarginRecorder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        balances: Arc<dyn BalanceStore>,
        contract: Address,
    ) -> Self {
        Self {
            chain,
            balances,
            contract,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub async fn available_margin(&self, account: Address) -> Result<I256> {
        read_contract(
            self.chain.as_ref(),
            self.contract,
            &IPerpsMarket::getAvailableMarginCall { account },
        )
        .await
    }

    pub async fn record(&self, account: &Account) -> Result<BalanceSnapshot> {
        let address = account.chain_address().ok_or_else(|| {
            IndexerError::InvalidAddress(format!(
                "account {} is stored as {:?}",
                account.id, account.address
            ))
        })?;

        let margin = self.available_margin(address).await?;

        self.balances
            .append_snapshot(&NewBalanceSnapshot::new(account.id, self.contract, margin))
            .await
    }
}
