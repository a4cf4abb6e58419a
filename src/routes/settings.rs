//! Weather settings endpoints.
//!
//! - GET   /api/v1/weather/settings
//! - PATCH /api/v1/weather/settings

use axum::extract::State;
use axum::Json;

use super::AppState;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::services::settings::{SettingsUpdate, WeatherSettings};

/// Attempts before a settings update gives up on concurrent writers.
const UPDATE_ATTEMPTS: usize = 3;

#[utoipa::path(
    get,
    path = "/api/v1/weather/settings",
    tag = "Weather",
    responses(
        (status = 200, description = "Current weather settings", body = WeatherSettings),
    )
)]
pub async fn get_settings(
    State(state): State<AppState>,
) -> Result<Json<WeatherSettings>, AppError> {
    Ok(Json(queries::get_settings(&state.pool).await?))
}

/// Partially update weather settings.
///
/// Omitted fields are unchanged. The merged result is validated as a whole,
/// so e.g. a yellow precipitation threshold above the red one is rejected.
/// The write is conditioned on the settings version; if the tuner changes
/// the drying rate mid-request the update is re-applied on fresh settings.
#[utoipa::path(
    patch,
    path = "/api/v1/weather/settings",
    tag = "Weather",
    request_body = SettingsUpdate,
    responses(
        (status = 200, description = "Updated weather settings", body = WeatherSettings),
        (status = 400, description = "Invalid settings", body = ErrorResponse),
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<WeatherSettings>, AppError> {
    for _ in 0..UPDATE_ATTEMPTS {
        let current = queries::get_settings(&state.pool).await?;
        let merged = current.apply(&update)?;
        if let Some(saved) = queries::update_settings(&state.pool, &merged, current.version).await? {
            tracing::info!("Weather settings updated to version {}", saved.version);
            return Ok(Json(saved));
        }
        tracing::debug!("Settings version {} changed during update, retrying", current.version);
    }
    Err(AppError::InternalError(
        "Settings are being changed concurrently; try again".to_string(),
    ))
}
