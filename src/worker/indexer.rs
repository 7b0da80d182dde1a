use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::Address;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    chain::{ChainClient, LogEntry, LogFilter},
    config::Settings,
    db::{models::NewAccount, AccountStore, CheckpointStore, Insertion},
    error::{IndexerError, Result},
    worker::{
        margin::MarginRecorder,
        parser::{account_created_filter, parse_account_created, sort_by_position},
    },
};

/// Interval for logging progress updates (10 seconds)
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub factory_address: Address,
    pub deployed_block: u64,
    pub checkpoint_name: String,
    /// Blocks processed before the checkpoint is persisted during backfill
    pub backfill_window: u64,
    pub recovery_backoff: Duration,
}

impl IndexerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            factory_address: settings.factory_address,
            deployed_block: settings.deployed_block,
            checkpoint_name: settings.checkpoint_name.clone(),
            backfill_window: settings.indexer.backfill_window_blocks,
            recovery_backoff: settings.indexer.recovery_backoff(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexerState {
    Initializing,
    Backfilling { checkpoint: u64 },
    Live { checkpoint: u64 },
    Recovering,
}

/// Result of replaying one block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOutcome {
    Completed,
    /// Cancelled between two logs; the range must not be checkpointed.
    Interrupted,
}

/// Keeps the account table in sync with the factory's `AccountCreated` log.
///
/// The indexer first replays every block between its durable checkpoint and
/// the chain head in bounded windows, then follows a live subscription.
/// Any RPC or storage failure sends it through a fixed backoff and back to
/// the durable checkpoint, so a range is only ever checkpointed once all of
/// its logs are persisted. Replaying a range is harmless because account
/// insertion is idempotent.
///
/// The indexer is the only writer of its checkpoint: `run` consumes it and
/// drives every state transition from a single task.
pub struct AccountIndexer {
    chain: Arc<dyn ChainClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    accounts: Arc<dyn AccountStore>,
    margins: MarginRecorder,
    filter: LogFilter,
    options: IndexerOptions,
    last_progress_log: Instant,
}

impl AccountIndexer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        accounts: Arc<dyn AccountStore>,
        margins: MarginRecorder,
        options: IndexerOptions,
    ) -> Self {
        Self {
            filter: account_created_filter(options.factory_address),
            chain,
            checkpoints,
            accounts,
            margins,
            options: IndexerOptions {
                backfill_window: options.backfill_window.max(1),
                ..options
            },
            last_progress_log: Instant::now(),
        }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            "[Indexer] Starting for factory {} (cursor {:?})",
            self.options.factory_address, self.options.checkpoint_name
        );

        let mut state = IndexerState::Initializing;
        while !cancellation_token.is_cancelled() {
            match self.step(state, &cancellation_token).await {
                Some(next) => state = next,
                None => break,
            }
        }

        info!("[Indexer] Received cancellation signal, stopped");
        Ok(())
    }

    /// Performs the work of `state` and returns the next state, or `None` once cancelled.
    async fn step(
        &mut self,
        state: IndexerState,
        cancellation_token: &CancellationToken,
    ) -> Option<IndexerState> {
        let next = match state {
            IndexerState::Initializing => self
                .initialize()
                .await
                .map(|checkpoint| Some(IndexerState::Backfilling { checkpoint })),
            IndexerState::Backfilling { checkpoint } => self
                .backfill(checkpoint, cancellation_token)
                .await
                .map(|caught_up| caught_up.map(|checkpoint| IndexerState::Live { checkpoint })),
            IndexerState::Live { checkpoint } => self
                .follow(checkpoint, cancellation_token)
                .await
                .map(|()| None),
            IndexerState::Recovering => {
                tokio::select! {
                    _ = cancellation_token.cancelled() => return None,
                    _ = tokio::time::sleep(self.options.recovery_backoff) => {},
                }
                Ok(Some(IndexerState::Initializing))
            },
        };

        match next {
            Ok(next) => next,
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        "[Indexer] {:?} failed: {:#}. Recovering in {:?}",
                        state, e, self.options.recovery_backoff
                    );
                } else {
                    error!(
                        "[Indexer] {:?} failed: {:#}. Recovering in {:?}",
                        state, e, self.options.recovery_backoff
                    );
                }
                Some(IndexerState::Recovering)
            },
        }
    }

    /// Reads the durable checkpoint, seeding it with the deployment block on first run.
    async fn initialize(&self) -> Result<u64> {
        let name = &self.options.checkpoint_name;

        if let Some(checkpoint) = self.checkpoints.get_checkpoint(name).await? {
            info!("[Indexer] Resuming from checkpoint {}", checkpoint);
            return Ok(checkpoint);
        }

        let seed = self.options.deployed_block;
        self.checkpoints.set_checkpoint(name, seed).await?;
        info!("[Indexer] No checkpoint found, seeded at deployment block {}", seed);
        Ok(seed)
    }

    /// Replays windows after `checkpoint` until the chain head is reached.
    ///
    /// Returns the caught-up checkpoint, or `None` when cancelled mid-window.
    async fn backfill(
        &mut self,
        mut checkpoint: u64,
        cancellation_token: &CancellationToken,
    ) -> Result<Option<u64>> {
        loop {
            let head = self.chain.current_height().await?;
            if checkpoint >= head {
                return Ok(Some(checkpoint));
            }

            let from = checkpoint + 1;
            let to = head.min(checkpoint.saturating_add(self.options.backfill_window));

            match self.process_range(from, to, cancellation_token).await? {
                RangeOutcome::Completed => {
                    self.advance(to).await?;
                    checkpoint = to;
                    self.log_progress(checkpoint, head);
                },
                RangeOutcome::Interrupted => {
                    info!(
                        "[Indexer] Window {}-{} interrupted, checkpoint stays at {}",
                        from, to, checkpoint
                    );
                    return Ok(None);
                },
            }
        }
    }

    async fn process_range(
        &self,
        from_block: u64,
        to_block: u64,
        cancellation_token: &CancellationToken,
    ) -> Result<RangeOutcome> {
        let mut logs = self.chain.get_logs(&self.filter, from_block, to_block).await?;
        sort_by_position(&mut logs);

        debug!(
            "[Indexer] {} creation logs in blocks {}-{}",
            logs.len(),
            from_block,
            to_block
        );

        for log in &logs {
            if cancellation_token.is_cancelled() {
                return Ok(RangeOutcome::Interrupted);
            }
            self.process_log(log).await?;
        }

        Ok(RangeOutcome::Completed)
    }

    /// Persists the account of one creation log and snapshots its margin.
    ///
    /// Decode and insert failures are returned; margin failures are only logged.
    async fn process_log(&self, log: &LogEntry) -> Result<()> {
        let event = parse_account_created(log)?;
        let (account, insertion) = self
            .accounts
            .insert_account(&NewAccount::from_event(&event))
            .await?;

        match insertion {
            Insertion::Created => info!(
                "[Indexer] New account {} created by {} at block {}",
                account.address, account.creator, log.block_number
            ),
            Insertion::Existing => debug!(
                "[Indexer] Account {} already indexed (block {})",
                account.address, log.block_number
            ),
        }

        if let Err(e) = self.margins.record(&account).await {
            warn!(
                "[Indexer] Failed to snapshot margin of {}: {:#}",
                account.address, e
            );
        }

        Ok(())
    }

    /// Follows new logs until the subscription dies or the token is cancelled.
    ///
    /// Returns `Ok` only on cancellation.
    async fn follow(
        &mut self,
        checkpoint: u64,
        cancellation_token: &CancellationToken,
    ) -> Result<()> {
        let mut subscription = self.chain.subscribe_logs(&self.filter).await?;

        // Blocks mined between the last backfill and the subscription start.
        let Some(mut checkpoint) = self.backfill(checkpoint, cancellation_token).await? else {
            return Ok(());
        };

        info!("[Indexer] Live from block {}", checkpoint);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => return Ok(()),
                batch = subscription.next() => match batch {
                    Some(Ok(logs)) => {
                        checkpoint = self
                            .process_live_batch(checkpoint, logs, cancellation_token)
                            .await?;
                    },
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(IndexerError::RpcUnavailable(
                            "log subscription closed".to_string(),
                        ))
                    },
                },
            }
        }
    }

    /// Processes one pushed batch and returns the resulting checkpoint.
    ///
    /// A log at block `B` only proves that blocks up to `B - 1` are complete:
    /// more logs of `B` may still follow, in this batch or the next one. The
    /// checkpoint therefore trails the newest live block by one and block `B`
    /// is replayed after a failure. A log below the checkpoint (late
    /// delivery, reorg) is still processed but never moves the checkpoint
    /// backwards.
    async fn process_live_batch(
        &self,
        mut checkpoint: u64,
        mut logs: Vec<LogEntry>,
        cancellation_token: &CancellationToken,
    ) -> Result<u64> {
        sort_by_position(&mut logs);

        for log in &logs {
            if cancellation_token.is_cancelled() {
                break;
            }

            self.process_log(log).await?;

            let completed = log.block_number.saturating_sub(1);
            if completed > checkpoint {
                self.advance(completed).await?;
                checkpoint = completed;
            } else if log.block_number <= checkpoint {
                debug!(
                    "[Indexer] Late log at block {} behind checkpoint {}",
                    log.block_number, checkpoint
                );
            }
        }

        Ok(checkpoint)
    }

    async fn advance(&self, block_number: u64) -> Result<()> {
        self.checkpoints
            .set_checkpoint(&self.options.checkpoint_name, block_number)
            .await
    }

    fn log_progress(&mut self, checkpoint: u64, head: u64) {
        if self.last_progress_log.elapsed() < PROGRESS_LOG_INTERVAL && checkpoint < head {
            return;
        }
        self.last_progress_log = Instant::now();

        let span = head.saturating_sub(self.options.deployed_block).max(1);
        let done = checkpoint.saturating_sub(self.options.deployed_block);
        info!(
            "[Indexer] Backfill at block {} / {} ({:.1}%)",
            checkpoint,
            head,
            done as f64 / span as f64 * 100.0
        );
    }
}
