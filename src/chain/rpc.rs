use std::{future::IntoFuture, time::Duration};

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes},
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log, TransactionRequest},
    transports::{TransportError, TransportResult},
};
use async_trait::async_trait;
use futures::StreamExt;
use log::{info, warn};
use url::Url;

use crate::{
    chain::{check_range, ChainClient, LogEntry, LogFilter, LogSubscription, SubscriptionFeed},
    config::IndexerSettings,
    error::{IndexerError, Result},
};

/// Batches buffered between the subscription task and the indexer
const SUBSCRIPTION_BUFFER: usize = 64;

/// [`ChainClient`] backed by alloy providers.
///
/// Range queries and calls go over HTTP. Live logs are pushed over a
/// WebSocket `eth_subscribe` when `ws_url` is set, otherwise they come from
/// an `eth_newFilter` poller on the HTTP provider.
pub struct AlloyChainClient {
    provider: DynProvider,
    ws_url: Option<String>,
    max_block_range: u64,
    rpc_timeout: Duration,
    poll_interval: Duration,
}

impl AlloyChainClient {
    pub fn new(rpc_url: &str, ws_url: Option<String>, settings: &IndexerSettings) -> Result<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| IndexerError::ConfigMissing(format!("rpc_url: {}", e)))?;

        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));

        Ok(Self {
            provider,
            ws_url,
            max_block_range: settings.max_block_range.max(1),
            rpc_timeout: settings.rpc_timeout(),
            poll_interval: settings.poll_interval(),
        })
    }

    async fn timed<T, F>(&self, method: &str, request: F) -> Result<TransportResult<T>>
    where
        F: IntoFuture<Output = TransportResult<T>>,
    {
        tokio::time::timeout(self.rpc_timeout, request)
            .await
            .map_err(|_| {
                IndexerError::RpcUnavailable(format!(
                    "{} timed out after {:?}",
                    method, self.rpc_timeout
                ))
            })
    }

    async fn subscribe_ws(
        &self,
        ws_url: &str,
        filter: Filter,
        feed: SubscriptionFeed,
    ) -> Result<()> {
        let provider = self
            .timed(
                "ws connect",
                ProviderBuilder::new().connect_ws(WsConnect::new(ws_url)),
            )
            .await?
            .map_err(|e| rpc_error("ws connect", e))?;

        let subscription = self
            .timed("eth_subscribe", provider.subscribe_logs(&filter))
            .await?
            .map_err(|e| rpc_error("eth_subscribe", e))?;

        info!("Subscribed to logs over WebSocket");

        tokio::spawn(async move {
            // The subscription is backed by the provider's connection.
            let _provider = provider;
            let mut stream = Box::pin(subscription.into_stream());

            let closed = loop {
                tokio::select! {
                    _ = feed.cancelled() => break false,
                    item = stream.next() => match item {
                        Some(log) => {
                            let batch: Vec<LogEntry> = to_log_entry(log).into_iter().collect();
                            if !feed.send(batch).await {
                                break false;
                            }
                        },
                        None => break true,
                    }
                }
            };

            if closed {
                feed.fail(IndexerError::RpcUnavailable(
                    "WebSocket log subscription closed".to_string(),
                ))
                .await;
            }
        });

        Ok(())
    }

    async fn subscribe_polling(&self, filter: Filter, feed: SubscriptionFeed) -> Result<()> {
        let poller = self
            .timed("eth_newFilter", self.provider.watch_logs(&filter))
            .await?
            .map_err(|e| rpc_error("eth_newFilter", e))?;

        info!(
            "Watching logs with filter polling every {:?}",
            self.poll_interval
        );

        let mut stream = Box::pin(poller.with_poll_interval(self.poll_interval).into_stream());

        tokio::spawn(async move {
            let closed = loop {
                tokio::select! {
                    _ = feed.cancelled() => break false,
                    item = stream.next() => match item {
                        Some(logs) => {
                            let batch: Vec<LogEntry> =
                                logs.into_iter().filter_map(to_log_entry).collect();
                            if !feed.send(batch).await {
                                break false;
                            }
                        },
                        None => break true,
                    }
                }
            };

            if closed {
                feed.fail(IndexerError::RpcUnavailable(
                    "log filter poller stopped".to_string(),
                ))
                .await;
            }
        });

        Ok(())
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn current_height(&self) -> Result<u64> {
        self.timed("eth_blockNumber", self.provider.get_block_number())
            .await?
            .map_err(|e| rpc_error("eth_blockNumber", e))
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>> {
        check_range(from_block, to_block)?;

        let mut entries = Vec::new();
        let mut start = from_block;
        let mut width = self.max_block_range;

        loop {
            let end = start.saturating_add(width - 1).min(to_block);
            let page = Filter::new()
                .address(filter.address)
                .event_signature(filter.event_signature)
                .from_block(start)
                .to_block(end);

            match self.timed("eth_getLogs", self.provider.get_logs(&page)).await? {
                Ok(logs) => {
                    entries.extend(logs.into_iter().filter_map(to_log_entry));
                    if end == to_block {
                        break;
                    }
                    start = end + 1;
                },
                Err(e) if width > 1 && is_range_rejection(&e) => {
                    width = (width / 2).max(1);
                    warn!(
                        "Node rejected eth_getLogs range {}..={} ({}), retrying with {} blocks",
                        start, end, e, width
                    );
                },
                Err(e) => return Err(rpc_error("eth_getLogs", e)),
            }
        }

        Ok(entries)
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription> {
        let (feed, subscription) = LogSubscription::channel(SUBSCRIPTION_BUFFER);
        let live = Filter::new()
            .address(filter.address)
            .event_signature(filter.event_signature);

        match &self.ws_url {
            Some(ws_url) => self.subscribe_ws(ws_url, live, feed).await?,
            None => self.subscribe_polling(live, feed).await?,
        }

        Ok(subscription)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::default().with_to(to).with_input(data);

        self.timed("eth_call", self.provider.call(request))
            .await?
            .map_err(|e| match e.as_error_resp() {
                Some(payload) => IndexerError::CallReverted(payload.message.to_string()),
                None => rpc_error("eth_call", e),
            })
    }
}

fn rpc_error(method: &str, e: TransportError) -> IndexerError {
    IndexerError::RpcUnavailable(format!("{} failed: {}", method, e))
}

/// Nodes phrase "range too wide" differently; match the common wordings.
fn is_range_rejection(e: &TransportError) -> bool {
    let Some(payload) = e.as_error_resp() else {
        return false;
    };
    let message = payload.message.to_lowercase();
    ["range", "limit", "too many", "exceed", "10000 results"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Converts an RPC log, dropping pending logs and logs removed by a reorg.
fn to_log_entry(log: Log) -> Option<LogEntry> {
    if log.removed {
        return None;
    }

    Some(LogEntry {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number?,
        transaction_index: log.transaction_index.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
    })
}
