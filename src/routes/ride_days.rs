//! Ride-day scoring endpoint.
//!
//! - GET /api/v1/weather/ride-days

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::errors::{AppError, ErrorResponse};
use crate::services::ride_day::{run_ride_day_pass, RideDayPass};

/// Score the forecast days for riding.
///
/// Fetches the forecast and recent rain for the configured location,
/// scores each day green/yellow/red with reasons, and stores a snapshot per
/// day for later grading against reported footing. When recent rain cannot
/// be fetched, days are still scored and carry a note that ground
/// conditions were not assessed.
#[utoipa::path(
    get,
    path = "/api/v1/weather/ride-days",
    tag = "Weather",
    responses(
        (status = 200, description = "Scored forecast days with current alerts", body = RideDayPass),
        (status = 412, description = "Location or forecast source not configured", body = ErrorResponse),
        (status = 502, description = "Forecast provider unavailable", body = ErrorResponse),
    )
)]
pub async fn get_ride_days(State(state): State<AppState>) -> Result<Json<RideDayPass>, AppError> {
    let pass = run_ride_day_pass(
        &state.pool,
        state.forecast.as_deref(),
        state.snapshot_retention_days,
    )
    .await?;
    Ok(Json(pass))
}
