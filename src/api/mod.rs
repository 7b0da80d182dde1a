//! HTTP read layer over the account and balance stores.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    routing::{get, put},
    Router,
};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::db::{AccountStore, BalanceStore, CheckpointStore};

pub mod accounts;
pub mod balances;
pub mod error;
pub mod health;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub checkpoint_name: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/accounts", get(accounts::list_accounts))
        .route("/accounts/{address}", get(accounts::get_account))
        .route(
            "/accounts/{address}/username",
            put(accounts::update_username),
        )
        .route("/balances/{address}/latest", get(balances::latest_balance))
        .route("/balances/{address}/history", get(balances::balance_history))
        .with_state(state)
}

/// Serves the API on `port` until the token is cancelled.
pub async fn serve(
    state: AppState,
    port: u16,
    cancellation_token: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    info!("[Api] Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("[Api] Stopped");
    Ok(())
}
