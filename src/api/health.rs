use axum::{extract::State, http::StatusCode, Json};
use log::warn;
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    /// Last block fully processed by the indexer, absent before the first run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<u64>,
}

/// Returns 200 with the current checkpoint, or 503 when the store is unreachable.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.checkpoints.get_checkpoint(&state.checkpoint_name).await {
        Ok(checkpoint) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                checkpoint,
            }),
        ),
        Err(e) => {
            warn!("[Api] Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    checkpoint: None,
                }),
            )
        },
    }
}
