use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PollerSettings,
    db::AccountStore,
    error::{IndexerError, Result},
    worker::MarginRecorder,
};

/// Outcome of one polling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub recorded: usize,
    pub skipped: usize,
}

/// Snapshots the available margin of every known account on a fixed interval.
///
/// A failed read for one account is logged and skipped. A cycle that cannot
/// run at all (account list or snapshot store unavailable) is retried after
/// `retry_interval` instead of waiting for the next tick.
pub struct MarginPoller {
    accounts: Arc<dyn AccountStore>,
    margins: MarginRecorder,
    interval: Duration,
    retry_interval: Duration,
}

impl MarginPoller {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        margins: MarginRecorder,
        settings: &PollerSettings,
    ) -> Self {
        Self {
            accounts,
            margins,
            interval: Duration::from_secs(settings.interval_secs),
            retry_interval: Duration::from_secs(settings.retry_secs),
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        info!(
            "[Poller] Started, snapshotting margins every {:?} from {}",
            self.interval,
            self.margins.contract()
        );

        loop {
            let delay = match self.poll_cycle(&cancellation_token).await {
                Ok(report) => {
                    info!(
                        "[Poller] Cycle done: {} snapshots recorded, {} accounts skipped",
                        report.recorded, report.skipped
                    );
                    self.interval
                },
                Err(e) => {
                    error!(
                        "[Poller] Cycle failed: {:#}. Retrying in {:?}",
                        e, self.retry_interval
                    );
                    self.retry_interval
                },
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {},
            }
        }

        info!("[Poller] Received cancellation signal, stopped");
        Ok(())
    }

    /// Records one snapshot per known account.
    pub async fn poll_cycle(&self, cancellation_token: &CancellationToken) -> Result<CycleReport> {
        let accounts = self.accounts.list_accounts().await?;
        let mut report = CycleReport::default();

        for account in &accounts {
            if cancellation_token.is_cancelled() {
                break;
            }

            match self.margins.record(account).await {
                Ok(_) => report.recorded += 1,
                Err(e @ IndexerError::StorageUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "[Poller] Skipping margin of {}: {:#}",
                        account.address, e
                    );
                    report.skipped += 1;
                },
            }
        }

        Ok(report)
    }
}
