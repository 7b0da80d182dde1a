use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use memebank_indexer::{
    api, AccountIndexer, AlloyChainClient, AppState, ChainClient, Database, IndexerOptions,
    MarginPoller, MarginRecorder, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine, the environment may already be populated
    let _ = dotenvy::dotenv();

    let settings = Settings::new().context(
        "Failed to load configuration. Set RPC_URL, FACTORY_ADDRESS, MARGIN_CONTRACT_ADDRESS, \
         DEPLOYED_BLOCK and POSTGRES__* or provide a config file",
    )?;

    SimpleLogger::new()
        .with_level(settings.log_level_filter())
        .init()
        .context("Failed to initialize logger")?;

    let db = Database::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;

    let chain: Arc<dyn ChainClient> = Arc::new(
        AlloyChainClient::new(&settings.rpc_url, settings.ws_url.clone(), &settings.indexer)
            .context("Failed to create chain client")?,
    );

    run(settings, db, chain).await
}

async fn run(settings: Settings, db: Database, chain: Arc<dyn ChainClient>) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let margins = MarginRecorder::new(
        chain.clone(),
        db.balances(),
        settings.margin_contract_address,
    );

    let indexer = AccountIndexer::new(
        chain.clone(),
        db.checkpoints(),
        db.accounts(),
        margins.clone(),
        IndexerOptions::from_settings(&settings),
    );

    let indexer_token = cancellation_token.child_token();
    let indexer_handle = tokio::spawn(async move {
        if let Err(e) = indexer.run(indexer_token).await {
            error!("Indexer failed: {:#}", e);
        }
    });

    let poller = MarginPoller::new(db.accounts(), margins, &settings.poller);

    let poller_token = cancellation_token.child_token();
    let poller_handle = tokio::spawn(async move {
        if let Err(e) = poller.run(poller_token).await {
            error!("Margin poller failed: {:#}", e);
        }
    });

    let state = AppState {
        accounts: db.accounts(),
        balances: db.balances(),
        checkpoints: db.checkpoints(),
        checkpoint_name: settings.checkpoint_name.clone(),
    };

    let api_token = cancellation_token.child_token();
    let http_port = settings.http_port;
    let mut api_handle = tokio::spawn(async move { api::serve(state, http_port, api_token).await });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Indexer running. Press Ctrl+C to stop.");

    // The API task only returns early when the listener could not start
    let mut api_result = None;

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
            result = &mut api_handle => {
                api_result = Some(result);
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            result = &mut api_handle => {
                api_result = Some(result);
            },
        };
    }

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for indexer to stop...");
    let _ = indexer_handle.await;

    info!("Waiting for margin poller to stop...");
    let _ = poller_handle.await;

    let api_result = match api_result {
        Some(result) => result,
        None => api_handle.await,
    };

    match api_result {
        Ok(Ok(())) => {},
        Ok(Err(e)) => {
            error!("HTTP API failed: {:#}", e);
            return Err(e);
        },
        Err(e) => warn!("HTTP API task panicked: {}", e),
    }

    info!("All tasks stopped");
    Ok(())
}
