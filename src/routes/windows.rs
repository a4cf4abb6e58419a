//! Suggested ride window endpoints.
//!
//! - GET    /api/v1/ride-windows
//! - POST   /api/v1/ride-windows/sync
//! - DELETE /api/v1/ride-windows/:id?action=approve|dismiss

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::db::models::RideWindow;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::services::sync::{sync_ride_windows, SyncSummary};

#[derive(Debug, Serialize, ToSchema)]
pub struct RideWindowResponse {
    pub id: Uuid,
    pub date: NaiveDate,
    #[schema(value_type = String, example = "07:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "10:00:00")]
    pub end_time: NaiveTime,
    pub weather_score: String,
    pub weather_notes: Vec<String>,
    /// Set once the window has been pushed to the calendar
    pub ical_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<RideWindow> for RideWindowResponse {
    fn from(w: RideWindow) -> Self {
        Self {
            id: w.id,
            date: w.date,
            start_time: w.start_time,
            end_time: w.end_time,
            weather_score: w.weather_score,
            weather_notes: w.weather_notes,
            ical_uid: w.ical_uid,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    /// Keep the calendar event and block the slot; the ride is on
    Approve,
    /// Remove the calendar event as well
    #[default]
    Dismiss,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WindowActionQuery {
    /// "approve" or "dismiss" (default)
    #[serde(default)]
    pub action: WindowAction,
}

/// List stored ride windows, ordered by date and start time.
#[utoipa::path(
    get,
    path = "/api/v1/ride-windows",
    tag = "Windows",
    responses(
        (status = 200, description = "Suggested ride windows", body = Vec<RideWindowResponse>),
    )
)]
pub async fn list_windows(
    State(state): State<AppState>,
) -> Result<Json<Vec<RideWindowResponse>>, AppError> {
    let windows = queries::list_ride_windows(&state.pool).await?;
    Ok(Json(windows.into_iter().map(Into::into).collect()))
}

/// Run a window sync now and return what it did.
///
/// Shares a lock with the background worker, so this waits for any run in
/// progress.
#[utoipa::path(
    post,
    path = "/api/v1/ride-windows/sync",
    tag = "Windows",
    responses(
        (status = 200, description = "Sync completed", body = SyncSummary),
        (status = 412, description = "Location or forecast source not configured", body = ErrorResponse),
        (status = 502, description = "Forecast or calendar unavailable", body = ErrorResponse),
    )
)]
pub async fn trigger_sync(State(state): State<AppState>) -> Result<Json<SyncSummary>, AppError> {
    let started = Utc::now();
    let result = sync_ride_windows(&state.sync).await;
    let elapsed = (Utc::now() - started).num_milliseconds().max(0) as u64;

    state.sync_state.write().await.record(started, elapsed, &result);

    Ok(Json(result?))
}

/// Remove one suggested window.
///
/// An approved window keeps its calendar event and its slot stays taken in
/// later syncs. On dismissal the pushed calendar event is deleted too; a
/// calendar failure is logged and does not restore the window.
#[utoipa::path(
    delete,
    path = "/api/v1/ride-windows/{id}",
    tag = "Windows",
    params(
        ("id" = Uuid, Path, description = "Window ID"),
        WindowActionQuery,
    ),
    responses(
        (status = 204, description = "Window removed"),
        (status = 404, description = "Window not found", body = ErrorResponse),
    )
)]
pub async fn delete_window(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WindowActionQuery>,
) -> Result<StatusCode, AppError> {
    let removed = match query.action {
        WindowAction::Approve => queries::approve_ride_window(&state.pool, id).await?,
        WindowAction::Dismiss => queries::delete_ride_window(&state.pool, id).await?,
    };
    let window = removed.ok_or_else(|| AppError::NotFound(format!("Ride window {} not found", id)))?;

    tracing::info!(
        "Ride window {} {}-{} {:?}",
        window.date,
        window.start_time,
        window.end_time,
        query.action
    );

    if query.action == WindowAction::Dismiss {
        if let (Some(sink), Some(uid)) = (&state.sync.sink, &window.ical_uid) {
            if let Err(e) = sink.remove_window(uid).await {
                tracing::warn!("Calendar remove failed for {}: {}", uid, e);
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_action_defaults_to_dismiss() {
        let q: WindowActionQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.action, WindowAction::Dismiss);
        let q: WindowActionQuery = serde_json::from_str(r#"{"action":"approve"}"#).unwrap();
        assert_eq!(q.action, WindowAction::Approve);
    }

    #[test]
    fn test_response_serializes_times() {
        let resp = RideWindowResponse::from(RideWindow {
            id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            weather_score: "green".to_string(),
            weather_notes: Vec::new(),
            ical_uid: None,
            created_at: Utc::now(),
        });
        let body = serde_json::to_value(resp).unwrap();
        assert_eq!(body["start_time"], "07:00:00");
        assert_eq!(body["date"], "2026-05-02");
        assert!(body["ical_uid"].is_null());
    }
}
