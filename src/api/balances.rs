use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::{
    api::{
        error::{parse_address, ApiError},
        AppState,
    },
    db::models::BalanceSnapshot,
};

#[derive(Debug, Default, Deserialize)]
pub struct LatestBalanceQuery {
    /// Restricts the lookup to snapshots read from this contract
    pub contract: Option<String>,
}

pub async fn latest_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<LatestBalanceQuery>,
) -> Result<Json<BalanceSnapshot>, ApiError> {
    let address = parse_address(&address)?;
    let contract = query.contract.as_deref().map(parse_address).transpose()?;

    state
        .balances
        .find_latest_by_address(&address, contract.as_deref())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Balance not found"))
}

pub async fn balance_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<BalanceSnapshot>>, ApiError> {
    let address = parse_address(&address)?;

    Ok(Json(state.balances.find_history_by_address(&address).await?))
}
