//! Forecast data consumed by the footing engine.
//!
//! Units are fixed at the boundary: temperatures in °F, wind in mph,
//! precipitation in inches, probabilities in percent (0–100). Provider
//! clients convert into these types; nothing downstream converts units.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;

/// Thunderstorm condition codes (OpenWeatherMap group 2xx).
const THUNDERSTORM_CODES: std::ops::RangeInclusive<u16> = 200..=299;

/// Current-conditions snapshot at the site.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentConditions {
    /// Observation time; the reference "now" for moisture estimation
    pub observed_at: DateTime<Utc>,
    pub temp_f: f64,
    pub feels_like_f: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_mph: f64,
    pub wind_gust_mph: Option<f64>,
    /// Provider condition summary (e.g. "Rain")
    pub condition: Option<String>,
    pub condition_code: Option<u16>,
}

/// One day of the multi-day forecast, keyed by local date.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DayForecast {
    pub date: NaiveDate,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    pub temp_high_f: f64,
    pub temp_low_f: f64,
    /// Probability of precipitation, 0–100
    pub precip_chance_pct: f64,
    /// Forecast precipitation depth for the day, inches
    pub precip_inches: f64,
    pub wind_speed_mph: f64,
    pub wind_gust_mph: Option<f64>,
    pub condition: Option<String>,
    pub condition_code: Option<u16>,
}

impl DayForecast {
    pub fn has_thunderstorm(&self) -> bool {
        self.condition_code
            .is_some_and(|code| THUNDERSTORM_CODES.contains(&code))
    }
}

/// One hour of the short-range forecast.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HourForecast {
    pub time: DateTime<Utc>,
    pub temp_f: f64,
    pub wind_speed_mph: f64,
    pub wind_gust_mph: Option<f64>,
    pub precip_chance_pct: f64,
    pub precip_inches: f64,
}

/// Everything one forecast fetch returns for a location.
#[derive(Debug, Clone)]
pub struct ForecastBundle {
    pub current: CurrentConditions,
    pub daily: Vec<DayForecast>,
    pub hourly: Vec<HourForecast>,
    /// Site offset from UTC in seconds (negative west of Greenwich)
    pub timezone_offset_secs: i32,
}

/// Observed precipitation for one past interval.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RecentRainSample {
    pub time: DateTime<Utc>,
    pub amount_inches: f64,
}

/// Black-box weather provider.
///
/// `get_recent_rain` returns an error when history cannot be fetched; the
/// caller treats that as "moisture unknown", never as "no rain".
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn get_forecast(&self, lat: f64, lng: f64) -> Result<ForecastBundle, AppError>;

    async fn get_recent_rain(
        &self,
        lat: f64,
        lng: f64,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecentRainSample>, AppError>;
}
