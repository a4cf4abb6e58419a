use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::helpers::{dec_to_f64, opt_dec_to_f64};
use crate::services::accuracy::{ActualFooting, GradedFeedback};
use crate::services::scoring::DayScore;
use crate::services::settings::WeatherSettings;

/// The `weather_settings` singleton as stored.
#[derive(Debug, Clone, FromRow)]
pub struct WeatherSettingsRow {
    pub location_lat: Option<Decimal>,
    pub location_lng: Option<Decimal>,
    pub rain_cutoff_inches: Decimal,
    pub rain_window_hours: i32,
    pub cold_alert_temp_f: Decimal,
    pub heat_alert_temp_f: Decimal,
    pub wind_cutoff_mph: Decimal,
    pub has_indoor_arena: bool,
    pub footing_dry_hours_per_inch: Decimal,
    pub precip_chance_red_pct: Decimal,
    pub precip_chance_yellow_pct: Decimal,
    pub precip_amount_red_inches: Decimal,
    pub damp_moisture_ratio: Decimal,
    pub wind_caution_ratio: Decimal,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<WeatherSettingsRow> for WeatherSettings {
    fn from(row: WeatherSettingsRow) -> Self {
        Self {
            location_lat: opt_dec_to_f64(row.location_lat),
            location_lng: opt_dec_to_f64(row.location_lng),
            rain_cutoff_inches: dec_to_f64(row.rain_cutoff_inches),
            rain_window_hours: row.rain_window_hours,
            cold_alert_temp_f: dec_to_f64(row.cold_alert_temp_f),
            heat_alert_temp_f: dec_to_f64(row.heat_alert_temp_f),
            wind_cutoff_mph: dec_to_f64(row.wind_cutoff_mph),
            has_indoor_arena: row.has_indoor_arena,
            footing_dry_hours_per_inch: dec_to_f64(row.footing_dry_hours_per_inch),
            precip_chance_red_pct: dec_to_f64(row.precip_chance_red_pct),
            precip_chance_yellow_pct: dec_to_f64(row.precip_chance_yellow_pct),
            precip_amount_red_inches: dec_to_f64(row.precip_amount_red_inches),
            damp_moisture_ratio: dec_to_f64(row.damp_moisture_ratio),
            wind_caution_ratio: dec_to_f64(row.wind_caution_ratio),
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

/// A weekly ride slot. `day_of_week` is 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RideScheduleSlot {
    pub id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Persisted prediction for one date. `moisture_inches` is NULL when rain
/// history was unavailable.
#[derive(Debug, Clone, FromRow)]
pub struct WeatherSnapshot {
    pub date: NaiveDate,
    pub score: String,
    pub moisture_inches: Option<Decimal>,
    pub footing_dry_hours_per_inch: Decimal,
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reported footing after a ride (append-only).
#[derive(Debug, Clone, FromRow)]
pub struct FootingFeedback {
    pub id: Uuid,
    pub date: NaiveDate,
    pub ride_session_id: Option<Uuid>,
    pub actual_footing: String,
    pub created_at: DateTime<Utc>,
}

/// A stored suggested ride window.
#[derive(Debug, Clone, FromRow)]
pub struct RideWindow {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub weather_score: String,
    pub weather_notes: Vec<String>,
    /// Calendar event UID once pushed to the sink
    pub ical_uid: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Latest feedback for a date joined with that date's snapshot.
#[derive(Debug, Clone, FromRow)]
pub struct GradedFeedbackRow {
    pub date: NaiveDate,
    pub score: String,
    pub actual_footing: String,
    pub moisture_inches: Option<Decimal>,
    pub footing_dry_hours_per_inch: Decimal,
}

impl GradedFeedbackRow {
    /// `None` if either enum column holds an unknown value.
    pub fn into_domain(self) -> Option<GradedFeedback> {
        let predicted: DayScore = self.score.parse().ok()?;
        let actual: ActualFooting = self.actual_footing.parse().ok()?;
        Some(GradedFeedback {
            date: self.date,
            predicted,
            actual,
            dry_hours_used: dec_to_f64(self.footing_dry_hours_per_inch),
            moisture_known: self.moisture_inches.is_some(),
        })
    }
}
