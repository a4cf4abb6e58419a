//! Ground-moisture estimation.
//!
//! Moisture is a single scalar in inch-equivalents. Each rain sample dries
//! linearly at `footing_dry_hours_per_inch` and stops contributing once it
//! reaches zero. Projection forward uses the daily forecast in the same way.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::forecast::{CurrentConditions, DayForecast, RecentRainSample};
use crate::services::settings::WeatherSettings;

/// Daily forecast amounts below this count as no rain at all.
pub const TRACE_PRECIP_INCHES: f64 = 0.01;

const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MoistureState {
    /// Estimated accumulated wetness, inches
    pub current_moisture: f64,
    pub as_of: NaiveDate,
    /// False when rain history was empty or unavailable. A zero estimate
    /// then means "unknown", not "dry".
    pub data_available: bool,
}

impl MoistureState {
    pub fn unknown(as_of: NaiveDate) -> Self {
        Self {
            current_moisture: 0.0,
            as_of,
            data_available: false,
        }
    }

    /// Saturated at or above the cutoff. Unknown moisture is never saturated.
    pub fn is_saturated(&self, settings: &WeatherSettings) -> bool {
        self.data_available && self.current_moisture >= settings.rain_cutoff_inches
    }
}

/// Estimate today's moisture from the recent rain history.
///
/// The reference time is `current.observed_at`; samples outside
/// `[observed_at - rain_window_hours, observed_at]` are ignored.
pub fn estimate_moisture(
    recent_rain: &[RecentRainSample],
    current: &CurrentConditions,
    settings: &WeatherSettings,
) -> MoistureState {
    let now = current.observed_at;
    let as_of = now.date_naive();

    if recent_rain.is_empty() {
        return MoistureState::unknown(as_of);
    }

    let rate = settings.effective_dry_rate();
    let window_start = now - Duration::hours(i64::from(settings.rain_window_hours.max(1)));

    let current_moisture = recent_rain
        .iter()
        .filter(|s| s.time >= window_start && s.time <= now)
        .map(|s| remaining_after(s.amount_inches, now, s.time, rate))
        .sum();

    MoistureState {
        current_moisture,
        as_of,
        data_available: true,
    }
}

fn remaining_after(amount: f64, now: DateTime<Utc>, at: DateTime<Utc>, rate: f64) -> f64 {
    let elapsed_hours = (now - at).num_seconds() as f64 / 3600.0;
    (amount.max(0.0) - elapsed_hours / rate).max(0.0)
}

/// Project moisture `days_ahead` days past today using the daily forecast.
///
/// `daily[0]` is today. For each day before the target, drying happens first
/// and then the day's forecast rain is added. The drying hours shrink with
/// the day's precipitation probability, so a wet forecast never dries the
/// ground faster than a dry one. Days missing from `daily` are fully dry.
pub fn estimate_future_moisture(
    today: &MoistureState,
    days_ahead: usize,
    daily: &[DayForecast],
    settings: &WeatherSettings,
) -> MoistureState {
    let rate = settings.effective_dry_rate();
    let mut moisture = today.current_moisture;

    for i in 0..days_ahead {
        let (dry_hours, amount) = match daily.get(i) {
            Some(day) => drying_for(day),
            None => (HOURS_PER_DAY, 0.0),
        };
        moisture = (moisture - dry_hours / rate).max(0.0) + amount;
    }

    let as_of = daily
        .get(days_ahead)
        .map(|d| d.date)
        .unwrap_or_else(|| today.as_of + Duration::days(days_ahead as i64));

    MoistureState {
        current_moisture: moisture,
        as_of,
        data_available: today.data_available,
    }
}

/// Dry hours and added rain for one forecast day.
fn drying_for(day: &DayForecast) -> (f64, f64) {
    let amount = day.precip_inches.max(0.0);
    if amount < TRACE_PRECIP_INCHES {
        return (HOURS_PER_DAY, 0.0);
    }
    let pop = (day.precip_chance_pct / 100.0).clamp(0.0, 1.0);
    (HOURS_PER_DAY * (1.0 - pop), amount)
}
