//! Background worker status endpoints.
//!
//! - GET /api/v1/sync/status
//! - GET /api/v1/tuner/status

use axum::extract::State;
use axum::Json;

use crate::services::sync::{SharedSyncState, SyncState};
use crate::services::tuner::{SharedTunerState, TunerState};

/// Get the window sync worker status.
///
/// Returns schedule info (interval, next_run_at) and the outcome of the
/// last run, including its summary when it succeeded.
#[utoipa::path(
    get,
    path = "/api/v1/sync/status",
    tag = "Status",
    responses(
        (status = 200, description = "Current window sync status", body = SyncState),
    )
)]
pub async fn get_sync_status(State(state): State<SharedSyncState>) -> Json<SyncState> {
    let s = state.read().await;
    Json(s.clone())
}

/// Get the drying-rate tuner status.
#[utoipa::path(
    get,
    path = "/api/v1/tuner/status",
    tag = "Status",
    responses(
        (status = 200, description = "Current tuner status", body = TunerState),
    )
)]
pub async fn get_tuner_status(State(state): State<SharedTunerState>) -> Json<TunerState> {
    let s = state.read().await;
    Json(s.clone())
}
