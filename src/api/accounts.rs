use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;

use crate::{
    api::{
        error::{parse_address, ApiError},
        AppState,
    },
    db::models::Account,
};

#[derive(Debug, Deserialize)]
pub struct UpdateUsernameRequest {
    #[serde(default)]
    pub username: Option<String>,
}

pub async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<Account>>, ApiError> {
    Ok(Json(state.accounts.list_accounts().await?))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let address = parse_address(&address)?;

    state
        .accounts
        .find_account(&address)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Account not found"))
}

pub async fn update_username(
    State(state): State<AppState>,
    Path(address): Path<String>,
    payload: Result<Json<UpdateUsernameRequest>, JsonRejection>,
) -> Result<Json<Account>, ApiError> {
    let address = parse_address(&address)?;
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let username = request
        .username
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("Username is required"))?;

    state
        .accounts
        .update_username(&address, username)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Account not found"))
}
