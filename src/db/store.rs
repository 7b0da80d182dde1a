use async_trait::async_trait;

use crate::{
    db::models::{Account, BalanceSnapshot, NewAccount, NewBalanceSnapshot},
    error::Result,
};

/// Durable block cursors, one per name.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get_checkpoint(&self, name: &str) -> Result<Option<u64>>;

    /// Upserts the cursor. A successful return means the value is committed.
    async fn set_checkpoint(&self, name: &str, block_number: u64) -> Result<()>;
}

/// Whether an insert created the row or found it already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Created,
    Existing,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts the account unless its address is already known.
    ///
    /// An existing address is not an error: the stored row is returned with
    /// [`Insertion::Existing`].
    async fn insert_account(&self, account: &NewAccount) -> Result<(Account, Insertion)>;

    async fn list_accounts(&self) -> Result<Vec<Account>>;

    async fn find_account(&self, address: &str) -> Result<Option<Account>>;

    /// Returns `None` when no account has this address.
    async fn update_username(&self, address: &str, username: &str) -> Result<Option<Account>>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn append_snapshot(&self, snapshot: &NewBalanceSnapshot) -> Result<BalanceSnapshot>;

    /// Newest snapshot of the account, across all contracts or for `contract` only.
    async fn find_latest_by_address(
        &self,
        address: &str,
        contract: Option<&str>,
    ) -> Result<Option<BalanceSnapshot>>;

    /// All snapshots of the account, oldest first.
    async fn find_history_by_address(&self, address: &str) -> Result<Vec<BalanceSnapshot>>;
}
