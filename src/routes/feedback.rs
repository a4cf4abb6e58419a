//! Footing feedback endpoints.
//!
//! - POST /api/v1/footing-feedback
//! - GET  /api/v1/footing-feedback?date=YYYY-MM-DD
//! - GET  /api/v1/footing-feedback/accuracy

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AppState;
use crate::db::models::{FootingFeedback, WeatherSnapshot};
use crate::db::queries::{self, NewFootingFeedback};
use crate::errors::{AppError, ErrorResponse};
use crate::helpers::{dec_to_f64, opt_dec_to_f64};
use crate::services::accuracy::{self, grade, AccuracyStats, ActualFooting, Outcome};
use crate::services::scoring::DayScore;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateFeedbackRequest {
    /// Date the footing was observed
    pub date: NaiveDate,
    pub ride_session_id: Option<Uuid>,
    /// One of "good", "soft", "unsafe"
    pub actual_footing: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FeedbackQuery {
    /// Date in YYYY-MM-DD format
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub date: NaiveDate,
    pub ride_session_id: Option<Uuid>,
    pub actual_footing: String,
    pub created_at: DateTime<Utc>,
}

impl From<FootingFeedback> for FeedbackResponse {
    fn from(f: FootingFeedback) -> Self {
        Self {
            id: f.id,
            date: f.date,
            ride_session_id: f.ride_session_id,
            actual_footing: f.actual_footing,
            created_at: f.created_at,
        }
    }
}

/// The prediction stored for a date.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub date: NaiveDate,
    pub score: String,
    /// `null` when moisture could not be assessed
    pub moisture_inches: Option<f64>,
    pub footing_dry_hours_per_inch: f64,
    pub reasons: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WeatherSnapshot> for SnapshotResponse {
    fn from(s: &WeatherSnapshot) -> Self {
        Self {
            date: s.date,
            score: s.score.clone(),
            moisture_inches: opt_dec_to_f64(s.moisture_inches),
            footing_dry_hours_per_inch: dec_to_f64(s.footing_dry_hours_per_inch),
            reasons: s.reasons.clone(),
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackForDateResponse {
    pub date: NaiveDate,
    /// Newest first
    pub feedback: Vec<FeedbackResponse>,
    pub snapshot: Option<SnapshotResponse>,
    /// Grade of the newest feedback against the snapshot
    pub outcome: Option<Outcome>,
}

/// Grade the newest feedback (first in `feedback`) against the snapshot.
fn latest_outcome(feedback: &[FootingFeedback], snapshot: Option<&WeatherSnapshot>) -> Option<Outcome> {
    let actual: ActualFooting = feedback.first()?.actual_footing.parse().ok()?;
    let predicted: DayScore = snapshot?.score.parse().ok()?;
    Some(grade(predicted, actual))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Record the footing found on a ride.
///
/// Feedback is append-only; the newest entry for a date is the one graded.
/// Each submission queues a drying-rate tuning pass without waiting for it.
#[utoipa::path(
    post,
    path = "/api/v1/footing-feedback",
    tag = "Feedback",
    request_body = CreateFeedbackRequest,
    responses(
        (status = 201, description = "Feedback recorded", body = FeedbackResponse),
        (status = 400, description = "Invalid actual_footing", body = ErrorResponse),
    )
)]
pub async fn create_feedback(
    State(state): State<AppState>,
    Json(req): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackResponse>), AppError> {
    let actual_footing: ActualFooting = req.actual_footing.parse()?;

    let row = queries::create_feedback(
        &state.pool,
        &NewFootingFeedback {
            date: req.date,
            ride_session_id: req.ride_session_id,
            actual_footing,
        },
    )
    .await?;

    tracing::info!("Footing feedback for {}: {}", row.date, row.actual_footing);
    state.tuner.try_request();

    Ok((StatusCode::CREATED, Json(row.into())))
}

/// Feedback for one date alongside the stored prediction.
#[utoipa::path(
    get,
    path = "/api/v1/footing-feedback",
    tag = "Feedback",
    params(FeedbackQuery),
    responses(
        (status = 200, description = "Feedback and snapshot for the date", body = FeedbackForDateResponse),
        (status = 400, description = "Invalid date", body = ErrorResponse),
    )
)]
pub async fn get_feedback_for_date(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> Result<Json<FeedbackForDateResponse>, AppError> {
    let feedback = queries::get_feedback_for_date(&state.pool, query.date).await?;
    let snapshot = queries::get_snapshot(&state.pool, query.date).await?;
    let outcome = latest_outcome(&feedback, snapshot.as_ref());

    Ok(Json(FeedbackForDateResponse {
        date: query.date,
        feedback: feedback.into_iter().map(Into::into).collect(),
        snapshot: snapshot.as_ref().map(Into::into),
        outcome,
    }))
}

/// Prediction accuracy over all graded feedback.
#[utoipa::path(
    get,
    path = "/api/v1/footing-feedback/accuracy",
    tag = "Feedback",
    responses(
        (status = 200, description = "Accuracy statistics", body = AccuracyStats),
    )
)]
pub async fn get_accuracy(State(state): State<AppState>) -> Result<Json<AccuracyStats>, AppError> {
    Ok(Json(accuracy::get_accuracy_stats(&state.pool).await?))
}
