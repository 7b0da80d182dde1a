//! In-memory chain client and stores for unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::Duration,
};

use alloy::{
    primitives::{Address, Bytes, B256, I256},
    sol_types::{SolCall, SolEvent},
};
use async_trait::async_trait;
use chrono::Utc;

use crate::{
    abis::{AccountCreated, IPerpsMarket},
    chain::{check_range, ChainClient, LogEntry, LogFilter, LogSubscription, SubscriptionFeed},
    db::{
        models::{Account, BalanceSnapshot, NewAccount, NewBalanceSnapshot},
        AccountStore, BalanceStore, CheckpointStore, Insertion,
    },
    error::{IndexerError, Result},
};

/// Builds an `AccountCreated` log emitted by `factory`.
pub fn account_created_log(
    factory: Address,
    account: Address,
    creator: Address,
    block_number: u64,
    log_index: u64,
) -> LogEntry {
    LogEntry {
        address: factory,
        topics: vec![
            AccountCreated::SIGNATURE_HASH,
            account.into_word(),
            creator.into_word(),
        ],
        data: Bytes::new(),
        block_number,
        transaction_index: 0,
        log_index,
    }
}

/// Deterministic address for test account `n`.
pub fn test_address(n: u8) -> Address {
    Address::repeat_byte(n)
}

/// Polls `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Default)]
struct ChainState {
    head: u64,
    logs: Vec<LogEntry>,
    get_logs_calls: Vec<(u64, u64)>,
    height_failures: usize,
    get_logs_failures: usize,
    margins: HashMap<Address, I256>,
    reverting: HashSet<Address>,
    unreachable: HashSet<Address>,
    feeds: Vec<SubscriptionFeed>,
    subscriptions_opened: usize,
}

/// Scripted chain: a head, a set of logs and per-account margins.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn add_log(&self, log: LogEntry) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn set_margin(&self, account: Address, margin: i64) {
        let margin = I256::try_from(margin).unwrap();
        self.state.lock().unwrap().margins.insert(account, margin);
    }

    pub fn revert_margin(&self, account: Address) {
        self.state.lock().unwrap().reverting.insert(account);
    }

    pub fn drop_margin_calls(&self, account: Address) {
        self.state.lock().unwrap().unreachable.insert(account);
    }

    pub fn fail_next_heights(&self, count: usize) {
        self.state.lock().unwrap().height_failures = count;
    }

    pub fn fail_next_get_logs(&self, count: usize) {
        self.state.lock().unwrap().get_logs_failures = count;
    }

    pub fn get_logs_calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().get_logs_calls.clone()
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.state.lock().unwrap().subscriptions_opened
    }

    /// Delivers a batch on the most recent live subscription.
    pub async fn push_live(&self, logs: Vec<LogEntry>) -> bool {
        let feed = self.state.lock().unwrap().feeds.last().cloned();
        match feed {
            Some(feed) => feed.send(logs).await,
            None => false,
        }
    }

    /// Fails every open subscription as a dropped connection would.
    pub async fn kill_subscriptions(&self) {
        let feeds: Vec<SubscriptionFeed> = self.state.lock().unwrap().feeds.drain(..).collect();
        for feed in feeds {
            feed.fail(IndexerError::RpcUnavailable("connection reset".to_string()))
                .await;
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_height(&self) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        if state.height_failures > 0 {
            state.height_failures -= 1;
            return Err(IndexerError::RpcUnavailable("eth_blockNumber timed out".into()));
        }
        Ok(state.head)
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>> {
        check_range(from_block, to_block)?;

        let mut state = self.state.lock().unwrap();
        if state.get_logs_failures > 0 {
            state.get_logs_failures -= 1;
            return Err(IndexerError::RpcUnavailable("eth_getLogs timed out".into()));
        }
        state.get_logs_calls.push((from_block, to_block));

        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.topics.first() == Some(&filter.event_signature)
                    && (from_block..=to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn subscribe_logs(&self, _filter: &LogFilter) -> Result<LogSubscription> {
        let (feed, subscription) = LogSubscription::channel(16);
        let mut state = self.state.lock().unwrap();
        state.feeds.push(feed);
        state.subscriptions_opened += 1;
        Ok(subscription)
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes> {
        let call = IPerpsMarket::getAvailableMarginCall::abi_decode(&data)
            .map_err(|e| IndexerError::CallReverted(e.to_string()))?;

        let state = self.state.lock().unwrap();
        if state.unreachable.contains(&call.account) {
            return Err(IndexerError::RpcUnavailable("eth_call timed out".into()));
        }
        if state.reverting.contains(&call.account) {
            return Err(IndexerError::CallReverted("execution reverted".into()));
        }

        let margin = state.margins.get(&call.account).copied().unwrap_or_default();
        Ok(Bytes::from(B256::from(margin.to_be_bytes::<32>()).to_vec()))
    }
}

#[derive(Default)]
struct StoreState {
    checkpoints: HashMap<String, u64>,
    checkpoint_writes: Vec<u64>,
    accounts: Vec<Account>,
    snapshots: Vec<BalanceSnapshot>,
    failing_accounts: HashSet<String>,
    unavailable: bool,
}

/// Checkpoint, account and balance stores kept in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes inserts of this (lowercase) address fail as if the database went away.
    pub fn fail_inserts_for(&self, address: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_accounts
            .insert(address.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_accounts.clear();
        state.unavailable = false;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn checkpoint(&self, name: &str) -> Option<u64> {
        self.state.lock().unwrap().checkpoints.get(name).copied()
    }

    pub fn checkpoint_writes(&self) -> Vec<u64> {
        self.state.lock().unwrap().checkpoint_writes.clone()
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.state.lock().unwrap().accounts.clone()
    }

    pub fn snapshots(&self) -> Vec<BalanceSnapshot> {
        self.state.lock().unwrap().snapshots.clone()
    }

    fn check_available(state: &StoreState) -> Result<()> {
        if state.unavailable {
            return Err(IndexerError::StorageUnavailable("connection refused".into()));
        }
        Ok(())
    }

    fn account_id(state: &StoreState, address: &str) -> Option<i64> {
        state
            .accounts
            .iter()
            .find(|account| account.address == address)
            .map(|account| account.id)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get_checkpoint(&self, name: &str) -> Result<Option<u64>> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.checkpoints.get(name).copied())
    }

    async fn set_checkpoint(&self, name: &str, block_number: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        state.checkpoints.insert(name.to_string(), block_number);
        state.checkpoint_writes.push(block_number);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &NewAccount) -> Result<(Account, Insertion)> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        if state.failing_accounts.contains(&account.address) {
            return Err(IndexerError::StorageUnavailable("insert timed out".into()));
        }

        if let Some(existing) = state.accounts.iter().find(|a| a.address == account.address) {
            return Ok((existing.clone(), Insertion::Existing));
        }

        let stored = Account {
            id: state.accounts.len() as i64 + 1,
            address: account.address.clone(),
            creator: account.creator.clone(),
            username: None,
            created_at: Utc::now(),
        };
        state.accounts.push(stored.clone());
        Ok((stored, Insertion::Created))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.accounts.clone())
    }

    async fn find_account(&self, address: &str) -> Result<Option<Account>> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state.accounts.iter().find(|a| a.address == address).cloned())
    }

    async fn update_username(&self, address: &str, username: &str) -> Result<Option<Account>> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        Ok(state
            .accounts
            .iter_mut()
            .find(|a| a.address == address)
            .map(|account| {
                account.username = Some(username.to_string());
                account.clone()
            }))
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn append_snapshot(&self, snapshot: &NewBalanceSnapshot) -> Result<BalanceSnapshot> {
        let mut state = self.state.lock().unwrap();
        Self::check_available(&state)?;

        let stored = BalanceSnapshot {
            id: state.snapshots.len() as i64 + 1,
            account_id: snapshot.account_id,
            contract_address: snapshot.contract_address.clone(),
            balance: snapshot.balance.clone(),
            timestamp: snapshot.timestamp,
        };
        state.snapshots.push(stored.clone());
        Ok(stored)
    }

    async fn find_latest_by_address(
        &self,
        address: &str,
        contract: Option<&str>,
    ) -> Result<Option<BalanceSnapshot>> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        let Some(account_id) = Self::account_id(&state, address) else {
            return Ok(None);
        };

        Ok(state
            .snapshots
            .iter()
            .filter(|s| s.account_id == account_id)
            .filter(|s| contract.map_or(true, |c| s.contract_address == c))
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned())
    }

    async fn find_history_by_address(&self, address: &str) -> Result<Vec<BalanceSnapshot>> {
        let state = self.state.lock().unwrap();
        Self::check_available(&state)?;
        let Some(account_id) = Self::account_id(&state, address) else {
            return Ok(vec![]);
        };

        let mut history: Vec<BalanceSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect();
        history.sort_by_key(|s| (s.timestamp, s.id));
        Ok(history)
    }
}
