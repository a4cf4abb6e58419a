//! One scoring pass: settings, forecast and recent rain in; scored days,
//! alerts and persisted snapshots out.

use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::models::RideScheduleSlot;
use crate::db::queries::{self, UpsertSnapshotParams};
use crate::errors::AppError;
use crate::services::alerts::{get_alerts, Alert};
use crate::services::forecast::{CurrentConditions, ForecastBundle, ForecastSource, RecentRainSample};
use crate::services::moisture::{estimate_moisture, MoistureState};
use crate::services::scoring::{score_days, ScoredDay};
use crate::services::settings::{WeatherSettings, MAX_RAIN_WINDOW_HOURS};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RideDayPass {
    pub days: Vec<ScoredDay>,
    pub alerts: Vec<Alert>,
    pub current: CurrentConditions,
    /// Today's estimate; `data_available` is false when rain history failed
    pub moisture: MoistureState,
    pub timezone_offset_secs: i32,
    pub footing_dry_hours_per_inch: f64,
    #[serde(skip)]
    pub schedule: Vec<RideScheduleSlot>,
}

/// Score a fetched forecast. `recent_rain` is `None` when the history
/// could not be fetched, which scores as unknown moisture.
pub fn build_pass(
    settings: &WeatherSettings,
    bundle: ForecastBundle,
    recent_rain: Option<Vec<RecentRainSample>>,
    schedule: Vec<RideScheduleSlot>,
) -> RideDayPass {
    let rain = recent_rain.unwrap_or_default();
    let days = score_days(
        &bundle.daily,
        settings,
        &rain,
        &bundle.current,
        &bundle.hourly,
        &schedule,
        bundle.timezone_offset_secs,
    );
    RideDayPass {
        days,
        alerts: get_alerts(&bundle.current, settings),
        moisture: estimate_moisture(&rain, &bundle.current, settings),
        current: bundle.current,
        timezone_offset_secs: bundle.timezone_offset_secs,
        footing_dry_hours_per_inch: settings.effective_dry_rate(),
        schedule,
    }
}

/// Run a full scoring pass and persist a snapshot per day.
///
/// Fails with `NotConfigured` when the site location or forecast source is
/// missing. A recent-rain failure degrades to unknown moisture. Snapshot
/// writes are best-effort and pruning runs detached.
pub async fn run_ride_day_pass(
    pool: &PgPool,
    source: Option<&dyn ForecastSource>,
    retention_days: u32,
) -> Result<RideDayPass, AppError> {
    let settings = queries::get_settings(pool).await?;
    let (lat, lng) = settings.location()?;
    let source = source.ok_or_else(|| {
        AppError::NotConfigured("Forecast source is not configured; set OWM_API_KEY".to_string())
    })?;

    let bundle = source.get_forecast(lat, lng).await?;

    let window_hours = settings.rain_window_hours.clamp(1, MAX_RAIN_WINDOW_HOURS) as u32;
    let recent_rain = match source
        .get_recent_rain(lat, lng, window_hours, bundle.current.observed_at)
        .await
    {
        Ok(samples) => Some(samples),
        Err(e) => {
            tracing::warn!("Recent rain unavailable, scoring without moisture: {}", e);
            None
        }
    };

    let schedule = queries::get_ride_schedule(pool).await?;
    let pass = build_pass(&settings, bundle, recent_rain, schedule);

    for day in &pass.days {
        let params = UpsertSnapshotParams {
            date: day.date,
            score: day.score,
            moisture_inches: day
                .moisture
                .data_available
                .then_some(day.moisture.current_moisture),
            footing_dry_hours_per_inch: pass.footing_dry_hours_per_inch,
            reasons: day.reasons.clone(),
        };
        if let Err(e) = queries::upsert_snapshot(pool, &params).await {
            tracing::warn!("Failed to store snapshot for {}: {}", day.date, e);
        }
    }

    let prune_pool = pool.clone();
    tokio::spawn(async move {
        match queries::prune_snapshots(&prune_pool, retention_days).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Pruned {} snapshots older than {} days", n, retention_days),
            Err(e) => tracing::warn!("Snapshot pruning failed: {}", e),
        }
    });

    tracing::info!(
        "Scored {} days (moisture {})",
        pass.days.len(),
        if pass.moisture.data_available {
            format!("{:.2}in", pass.moisture.current_moisture)
        } else {
            "unknown".to_string()
        }
    );

    Ok(pass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::forecast::fixtures::*;
    use crate::services::scoring::{DayScore, NOTE_MOISTURE_UNKNOWN};

    fn bundle() -> ForecastBundle {
        let now = at(date(2026, 5, 2), 12, 0);
        ForecastBundle {
            current: current_at(now),
            daily: vec![dry_day(date(2026, 5, 2)), dry_day(date(2026, 5, 3))],
            hourly: Vec::new(),
            timezone_offset_secs: 0,
        }
    }

    #[test]
    fn test_failed_rain_history_scores_as_unknown() {
        let pass = build_pass(&WeatherSettings::default(), bundle(), None, Vec::new());
        assert!(!pass.moisture.data_available);
        for day in &pass.days {
            assert_eq!(day.score, DayScore::Green);
            assert!(day.notes.contains(&NOTE_MOISTURE_UNKNOWN.to_string()));
        }
    }

    #[test]
    fn test_recent_rain_flows_into_today_and_projection() {
        let now = at(date(2026, 5, 2), 12, 0);
        let rain_history = vec![rain(now, 1, 1.0)];
        let pass = build_pass(
            &WeatherSettings::default(),
            bundle(),
            Some(rain_history),
            Vec::new(),
        );
        assert!(pass.moisture.data_available);
        assert_eq!(pass.days[0].score, DayScore::Red);
        // One fully dry day at 24 h/in removes one inch
        assert_eq!(pass.days[1].score, DayScore::Green);
        assert_eq!(pass.footing_dry_hours_per_inch, 24.0);
    }

    #[test]
    fn test_alerts_use_current_conditions() {
        let mut b = bundle();
        b.current.temp_f = 95.0;
        let pass = build_pass(&WeatherSettings::default(), b, Some(Vec::new()), Vec::new());
        assert_eq!(pass.alerts.len(), 1);
    }
}
