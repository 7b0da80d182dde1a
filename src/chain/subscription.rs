use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    chain::LogEntry,
    error::{IndexerError, Result},
};

/// Consumer side of a live log subscription.
///
/// Dropping the subscription (or calling [`LogSubscription::unsubscribe`])
/// stops the producer task feeding it.
pub struct LogSubscription {
    receiver: mpsc::Receiver<Result<Vec<LogEntry>>>,
    cancel: CancellationToken,
}

/// Producer side of a live log subscription.
#[derive(Clone)]
pub struct SubscriptionFeed {
    sender: mpsc::Sender<Result<Vec<LogEntry>>>,
    cancel: CancellationToken,
}

impl LogSubscription {
    pub fn channel(buffer: usize) -> (SubscriptionFeed, LogSubscription) {
        let (sender, receiver) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();

        (
            SubscriptionFeed {
                sender,
                cancel: cancel.clone(),
            },
            LogSubscription { receiver, cancel },
        )
    }

    /// Next batch of logs.
    ///
    /// `None` means the producer went away without reporting an error, which
    /// callers treat the same as a transport failure.
    pub async fn next(&mut self) -> Option<Result<Vec<LogEntry>>> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SubscriptionFeed {
    /// Pushes a batch to the consumer. Returns `false` once the consumer is gone.
    pub async fn send(&self, logs: Vec<LogEntry>) -> bool {
        if logs.is_empty() {
            return !self.is_closed();
        }
        self.sender.send(Ok(logs)).await.is_ok()
    }

    /// Reports a terminal transport failure; the subscription is dead afterwards.
    pub async fn fail(self, error: IndexerError) {
        debug!("Log subscription failed: {}", error);
        let _ = self.sender.send(Err(error)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves once the consumer unsubscribed.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}
