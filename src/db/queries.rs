use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{
    FootingFeedback, GradedFeedbackRow, RideScheduleSlot, RideWindow, WeatherSettingsRow,
    WeatherSnapshot,
};
use crate::helpers::{f64_to_decimal, opt_f64_to_decimal};
use crate::services::accuracy::{ActualFooting, GradedFeedback};
use crate::services::scoring::DayScore;
use crate::services::settings::WeatherSettings;
use crate::services::windows::{BusyInterval, NewRideWindow};

const SETTINGS_COLUMNS: &str = "location_lat, location_lng, rain_cutoff_inches, rain_window_hours,
    cold_alert_temp_f, heat_alert_temp_f, wind_cutoff_mph, has_indoor_arena,
    footing_dry_hours_per_inch, precip_chance_red_pct, precip_chance_yellow_pct,
    precip_amount_red_inches, damp_moisture_ratio, wind_caution_ratio, version, updated_at";

const WINDOW_COLUMNS: &str =
    "id, date, start_time, end_time, weather_score, weather_notes, ical_uid, created_at";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Load the settings singleton.
pub async fn get_settings(pool: &PgPool) -> Result<WeatherSettings, sqlx::Error> {
    let row = sqlx::query_as::<_, WeatherSettingsRow>(&format!(
        "SELECT {SETTINGS_COLUMNS} FROM weather_settings WHERE id = 1"
    ))
    .fetch_one(pool)
    .await?;
    Ok(row.into())
}

/// Write a full settings value if the stored version still matches.
/// Returns `None` when another writer got there first.
pub async fn update_settings(
    pool: &PgPool,
    settings: &WeatherSettings,
    expected_version: i64,
) -> Result<Option<WeatherSettings>, sqlx::Error> {
    let row = sqlx::query_as::<_, WeatherSettingsRow>(&format!(
        "UPDATE weather_settings SET
            location_lat = $1, location_lng = $2,
            rain_cutoff_inches = $3, rain_window_hours = $4,
            cold_alert_temp_f = $5, heat_alert_temp_f = $6,
            wind_cutoff_mph = $7, has_indoor_arena = $8,
            footing_dry_hours_per_inch = $9,
            precip_chance_red_pct = $10, precip_chance_yellow_pct = $11,
            precip_amount_red_inches = $12,
            damp_moisture_ratio = $13, wind_caution_ratio = $14,
            version = version + 1, updated_at = NOW()
         WHERE id = 1 AND version = $15
         RETURNING {SETTINGS_COLUMNS}"
    ))
    .bind(opt_f64_to_decimal(settings.location_lat, 6))
    .bind(opt_f64_to_decimal(settings.location_lng, 6))
    .bind(f64_to_decimal(settings.rain_cutoff_inches, 3))
    .bind(settings.rain_window_hours)
    .bind(f64_to_decimal(settings.cold_alert_temp_f, 1))
    .bind(f64_to_decimal(settings.heat_alert_temp_f, 1))
    .bind(f64_to_decimal(settings.wind_cutoff_mph, 1))
    .bind(settings.has_indoor_arena)
    .bind(f64_to_decimal(settings.footing_dry_hours_per_inch, 3))
    .bind(f64_to_decimal(settings.precip_chance_red_pct, 1))
    .bind(f64_to_decimal(settings.precip_chance_yellow_pct, 1))
    .bind(f64_to_decimal(settings.precip_amount_red_inches, 3))
    .bind(f64_to_decimal(settings.damp_moisture_ratio, 3))
    .bind(f64_to_decimal(settings.wind_caution_ratio, 3))
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Into::into))
}

/// Compare-and-swap write of the drying rate. Returns false if the settings
/// version moved since it was read.
pub async fn cas_update_dry_rate(
    pool: &PgPool,
    dry_hours_per_inch: f64,
    expected_version: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE weather_settings
         SET footing_dry_hours_per_inch = $1, version = version + 1, updated_at = NOW()
         WHERE id = 1 AND version = $2",
    )
    .bind(f64_to_decimal(dry_hours_per_inch, 3))
    .bind(expected_version)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

pub async fn get_ride_schedule(pool: &PgPool) -> Result<Vec<RideScheduleSlot>, sqlx::Error> {
    sqlx::query_as::<_, RideScheduleSlot>(
        "SELECT id, day_of_week, start_time, end_time
         FROM ride_schedule_slots
         ORDER BY day_of_week, start_time",
    )
    .fetch_all(pool)
    .await
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Parameters for upserting a day's prediction.
pub struct UpsertSnapshotParams {
    pub date: NaiveDate,
    pub score: DayScore,
    /// `None` when moisture could not be assessed
    pub moisture_inches: Option<f64>,
    pub footing_dry_hours_per_inch: f64,
    pub reasons: Vec<String>,
}

/// Insert or replace the snapshot for a date. `created_at` keeps the first
/// write; everything else reflects the latest pass.
pub async fn upsert_snapshot(
    pool: &PgPool,
    params: &UpsertSnapshotParams,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO weather_snapshots (
            date, score, moisture_inches, footing_dry_hours_per_inch, reasons,
            created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (date) DO UPDATE SET
            score = EXCLUDED.score,
            moisture_inches = EXCLUDED.moisture_inches,
            footing_dry_hours_per_inch = EXCLUDED.footing_dry_hours_per_inch,
            reasons = EXCLUDED.reasons,
            updated_at = NOW()",
    )
    .bind(params.date)
    .bind(params.score.as_str())
    .bind(opt_f64_to_decimal(params.moisture_inches, 3))
    .bind(f64_to_decimal(params.footing_dry_hours_per_inch, 3))
    .bind(&params.reasons)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_snapshot(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Option<WeatherSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, WeatherSnapshot>(
        "SELECT date, score, moisture_inches, footing_dry_hours_per_inch, reasons,
                created_at, updated_at
         FROM weather_snapshots WHERE date = $1",
    )
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// Delete snapshots dated more than `retention_days` before today.
pub async fn prune_snapshots(pool: &PgPool, retention_days: u32) -> Result<u64, sqlx::Error> {
    let days = i32::try_from(retention_days).unwrap_or(i32::MAX);
    let result = sqlx::query("DELETE FROM weather_snapshots WHERE date < CURRENT_DATE - $1::int")
        .bind(days)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// Parameters for recording reported footing.
pub struct NewFootingFeedback {
    pub date: NaiveDate,
    pub ride_session_id: Option<Uuid>,
    pub actual_footing: ActualFooting,
}

/// Append a feedback row.
pub async fn create_feedback(
    pool: &PgPool,
    params: &NewFootingFeedback,
) -> Result<FootingFeedback, sqlx::Error> {
    sqlx::query_as::<_, FootingFeedback>(
        "INSERT INTO footing_feedback (id, date, ride_session_id, actual_footing, created_at)
         VALUES ($1, $2, $3, $4, NOW())
         RETURNING id, date, ride_session_id, actual_footing, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(params.date)
    .bind(params.ride_session_id)
    .bind(params.actual_footing.as_str())
    .fetch_one(pool)
    .await
}

/// All feedback for a date, newest first.
pub async fn get_feedback_for_date(
    pool: &PgPool,
    date: NaiveDate,
) -> Result<Vec<FootingFeedback>, sqlx::Error> {
    sqlx::query_as::<_, FootingFeedback>(
        "SELECT id, date, ride_session_id, actual_footing, created_at
         FROM footing_feedback
         WHERE date = $1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Most recent feedback per date joined with that date's snapshot,
/// optionally limited to dates on or after `since`.
pub async fn get_graded_feedback(
    pool: &PgPool,
    since: Option<NaiveDate>,
) -> Result<Vec<GradedFeedback>, sqlx::Error> {
    let rows = sqlx::query_as::<_, GradedFeedbackRow>(
        "SELECT f.date, s.score, f.actual_footing, s.moisture_inches,
                s.footing_dry_hours_per_inch
         FROM (
             SELECT DISTINCT ON (date) date, actual_footing
             FROM footing_feedback
             WHERE $1::date IS NULL OR date >= $1::date
             ORDER BY date, created_at DESC, id DESC
         ) f
         JOIN weather_snapshots s ON s.date = f.date
         ORDER BY f.date",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let date = row.date;
            let graded = row.into_domain();
            if graded.is_none() {
                tracing::warn!("Skipping feedback for {} with unrecognised score or footing", date);
            }
            graded
        })
        .collect())
}

/// Number of distinct feedback dates with no snapshot to grade against.
pub async fn count_unmatched_feedback_dates(pool: &PgPool) -> Result<u32, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT f.date)
         FROM footing_feedback f
         LEFT JOIN weather_snapshots s ON s.date = f.date
         WHERE s.date IS NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
}

// ---------------------------------------------------------------------------
// Suggested ride windows
// ---------------------------------------------------------------------------

pub async fn list_ride_windows(pool: &PgPool) -> Result<Vec<RideWindow>, sqlx::Error> {
    sqlx::query_as::<_, RideWindow>(&format!(
        "SELECT {WINDOW_COLUMNS} FROM suggested_ride_windows ORDER BY date, start_time"
    ))
    .fetch_all(pool)
    .await
}

/// Result of replacing the stored window set.
#[derive(Debug, Clone)]
pub struct ReplacedWindows {
    pub current: Vec<RideWindow>,
    /// Previously stored windows with no counterpart in the new set
    pub removed: Vec<RideWindow>,
}

/// Replace every stored window with `windows` in one transaction.
///
/// The table lock serializes concurrent syncs so readers only ever see one
/// complete set. A window with the same date and times as a previous one
/// keeps that row's `ical_uid`.
pub async fn replace_ride_windows(
    pool: &PgPool,
    windows: &[NewRideWindow],
) -> Result<ReplacedWindows, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("LOCK TABLE suggested_ride_windows IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let previous = sqlx::query_as::<_, RideWindow>(&format!(
        "SELECT {WINDOW_COLUMNS} FROM suggested_ride_windows"
    ))
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM suggested_ride_windows")
        .execute(&mut *tx)
        .await?;

    let mut by_key: HashMap<(NaiveDate, NaiveTime, NaiveTime), RideWindow> = previous
        .into_iter()
        .map(|w| ((w.date, w.start_time, w.end_time), w))
        .collect();

    let mut current = Vec::with_capacity(windows.len());
    for w in windows {
        let carried_uid = by_key
            .remove(&(w.date, w.start_time, w.end_time))
            .and_then(|prev| prev.ical_uid);

        let row = sqlx::query_as::<_, RideWindow>(&format!(
            "INSERT INTO suggested_ride_windows (
                id, date, start_time, end_time, weather_score, weather_notes, ical_uid, created_at
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING {WINDOW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(w.date)
        .bind(w.start_time)
        .bind(w.end_time)
        .bind(w.weather_score.as_str())
        .bind(&w.weather_notes)
        .bind(carried_uid)
        .fetch_one(&mut *tx)
        .await?;
        current.push(row);
    }

    tx.commit().await?;

    let mut removed: Vec<RideWindow> = by_key.into_values().collect();
    removed.sort_by_key(|w| (w.date, w.start_time));

    Ok(ReplacedWindows { current, removed })
}

pub async fn set_window_ical_uid(pool: &PgPool, id: Uuid, uid: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE suggested_ride_windows SET ical_uid = $2 WHERE id = $1")
        .bind(id)
        .bind(uid)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete one window, returning it if it existed.
pub async fn delete_ride_window(pool: &PgPool, id: Uuid) -> Result<Option<RideWindow>, sqlx::Error> {
    sqlx::query_as::<_, RideWindow>(&format!(
        "DELETE FROM suggested_ride_windows WHERE id = $1 RETURNING {WINDOW_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Delete one window and record it as approved, in one transaction.
/// Returns the removed window, or `None` if it did not exist.
pub async fn approve_ride_window(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<RideWindow>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let window = sqlx::query_as::<_, RideWindow>(&format!(
        "DELETE FROM suggested_ride_windows WHERE id = $1 RETURNING {WINDOW_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(w) = &window {
        sqlx::query(
            "INSERT INTO approved_ride_windows (id, date, start_time, end_time, ical_uid, approved_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             ON CONFLICT (date, start_time, end_time) DO UPDATE SET
                ical_uid = COALESCE(EXCLUDED.ical_uid, approved_ride_windows.ical_uid)",
        )
        .bind(Uuid::new_v4())
        .bind(w.date)
        .bind(w.start_time)
        .bind(w.end_time)
        .bind(&w.ical_uid)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(window)
}

/// Approved windows on dates in `[start, end]`, as busy time.
pub async fn get_approved_intervals(
    pool: &PgPool,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<BusyInterval>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (NaiveDate, NaiveTime, NaiveTime)>(
        "SELECT date, start_time, end_time FROM approved_ride_windows
         WHERE date BETWEEN $1 AND $2
         ORDER BY date, start_time",
    )
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(date, start, end)| BusyInterval { date, start, end })
        .collect())
}

/// Delete approvals dated before today.
pub async fn prune_approved_windows(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM approved_ride_windows WHERE date < CURRENT_DATE")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
