//! OpenWeatherMap One Call 3.0 client.
//!
//! Forecasts come from `/data/3.0/onecall` in imperial units. Precipitation
//! is always reported in millimetres regardless of units and is converted
//! to inches here. Recent rain comes from `/data/3.0/onecall/timemachine`,
//! one request per past hour.
//! See: https://openweathermap.org/api/one-call-3

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::AppError;
use crate::helpers::{mm_to_inches, to_local};
use crate::services::forecast::{
    CurrentConditions, DayForecast, ForecastBundle, ForecastSource, HourForecast,
    RecentRainSample,
};

const ONECALL_PATH: &str = "/data/3.0/onecall";
const TIMEMACHINE_PATH: &str = "/data/3.0/onecall/timemachine";

/// Concurrent history requests per recent-rain fetch.
const HISTORY_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct OwmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// --- One Call JSON response types ---

#[derive(Debug, Deserialize)]
struct OneCallResponse {
    timezone_offset: i32,
    current: OwmCurrent,
    #[serde(default)]
    hourly: Vec<OwmHourly>,
    #[serde(default)]
    daily: Vec<OwmDaily>,
}

#[derive(Debug, Deserialize)]
struct OwmCurrent {
    dt: i64,
    temp: f64,
    feels_like: Option<f64>,
    humidity: Option<f64>,
    wind_speed: f64,
    wind_gust: Option<f64>,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmHourly {
    dt: i64,
    temp: f64,
    wind_speed: f64,
    wind_gust: Option<f64>,
    #[serde(default)]
    pop: f64,
    rain: Option<OwmVolume>,
    snow: Option<OwmVolume>,
}

#[derive(Debug, Deserialize)]
struct OwmDaily {
    dt: i64,
    sunrise: i64,
    sunset: i64,
    temp: OwmDailyTemp,
    wind_speed: f64,
    wind_gust: Option<f64>,
    #[serde(default)]
    pop: f64,
    /// Daily totals are a bare number, unlike the hourly `{"1h": ..}` objects
    rain: Option<f64>,
    snow: Option<f64>,
    #[serde(default)]
    weather: Vec<OwmWeather>,
}

#[derive(Debug, Deserialize)]
struct OwmDailyTemp {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct OwmWeather {
    id: u16,
    main: String,
}

#[derive(Debug, Deserialize)]
struct OwmVolume {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TimemachineResponse {
    #[serde(default)]
    data: Vec<TimemachinePoint>,
}

#[derive(Debug, Deserialize)]
struct TimemachinePoint {
    dt: i64,
    rain: Option<OwmVolume>,
    snow: Option<OwmVolume>,
}

fn volume_mm(v: &Option<OwmVolume>) -> f64 {
    v.as_ref().and_then(|x| x.one_hour).unwrap_or(0.0)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        AppError::ExternalServiceError(format!("OpenWeatherMap returned invalid timestamp {}", secs))
    })
}

impl OwmClient {
    pub fn new(base_url: &str, api_key: &str, timeout: std::time::Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        lat: f64,
        lng: f64,
        extra: &[(&str, String)],
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![
            ("lat", format!("{:.4}", lat)),
            ("lon", format!("{:.4}", lng)),
            ("appid", self.api_key.clone()),
            ("units", "imperial".to_string()),
        ];
        query.extend(extra.iter().cloned());

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("OpenWeatherMap request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "OpenWeatherMap returned HTTP {}",
                response.status()
            )));
        }

        response.json::<T>().await.map_err(|e| {
            AppError::ExternalServiceError(format!("OpenWeatherMap JSON parse error: {}", e))
        })
    }

    /// Fetch current conditions plus hourly and daily forecasts.
    pub async fn fetch_onecall(&self, lat: f64, lng: f64) -> Result<ForecastBundle, AppError> {
        let raw: serde_json::Value = self
            .get_json(
                ONECALL_PATH,
                lat,
                lng,
                &[("exclude", "minutely,alerts".to_string())],
            )
            .await?;
        parse_onecall(&raw)
    }

    /// Observed precipitation for the hour at `at`.
    async fn fetch_rain_at(
        &self,
        lat: f64,
        lng: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<RecentRainSample>, AppError> {
        let response: TimemachineResponse = self
            .get_json(
                TIMEMACHINE_PATH,
                lat,
                lng,
                &[("dt", at.timestamp().to_string())],
            )
            .await?;

        response
            .data
            .iter()
            .map(|p| -> Result<RecentRainSample, AppError> {
                Ok(RecentRainSample {
                    time: timestamp(p.dt)?,
                    amount_inches: mm_to_inches(volume_mm(&p.rain) + volume_mm(&p.snow)),
                })
            })
            .collect()
    }
}

/// Convert a One Call response into forecast types.
///
/// This is a pure function (no I/O). Daily entries are keyed by their local
/// date at the site.
pub fn parse_onecall(raw: &serde_json::Value) -> Result<ForecastBundle, AppError> {
    let resp: OneCallResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("OpenWeatherMap response structure error: {}", e))
    })?;
    let offset = resp.timezone_offset;

    let condition = |w: &[OwmWeather]| w.first().map(|w| (w.main.clone(), w.id));

    let current_condition = condition(&resp.current.weather);
    let current = CurrentConditions {
        observed_at: timestamp(resp.current.dt)?,
        temp_f: resp.current.temp,
        feels_like_f: resp.current.feels_like,
        humidity_pct: resp.current.humidity,
        wind_speed_mph: resp.current.wind_speed,
        wind_gust_mph: resp.current.wind_gust,
        condition: current_condition.as_ref().map(|(main, _)| main.clone()),
        condition_code: current_condition.map(|(_, id)| id),
    };

    let hourly = resp
        .hourly
        .iter()
        .map(|h| -> Result<HourForecast, AppError> {
            Ok(HourForecast {
                time: timestamp(h.dt)?,
                temp_f: h.temp,
                wind_speed_mph: h.wind_speed,
                wind_gust_mph: h.wind_gust,
                precip_chance_pct: (h.pop * 100.0).clamp(0.0, 100.0),
                precip_inches: mm_to_inches(volume_mm(&h.rain) + volume_mm(&h.snow)),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let daily = resp
        .daily
        .iter()
        .map(|d| -> Result<DayForecast, AppError> {
            let dt = timestamp(d.dt)?;
            let cond = condition(&d.weather);
            Ok(DayForecast {
                date: to_local(dt, offset).date(),
                sunrise: timestamp(d.sunrise)?,
                sunset: timestamp(d.sunset)?,
                temp_high_f: d.temp.max,
                temp_low_f: d.temp.min,
                precip_chance_pct: (d.pop * 100.0).clamp(0.0, 100.0),
                precip_inches: mm_to_inches(d.rain.unwrap_or(0.0) + d.snow.unwrap_or(0.0)),
                wind_speed_mph: d.wind_speed,
                wind_gust_mph: d.wind_gust,
                condition: cond.as_ref().map(|(main, _)| main.clone()),
                condition_code: cond.map(|(_, id)| id),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    if daily.is_empty() {
        return Err(AppError::ExternalServiceError(
            "OpenWeatherMap returned no daily forecast".to_string(),
        ));
    }

    Ok(ForecastBundle {
        current,
        daily,
        hourly,
        timezone_offset_secs: offset,
    })
}

#[async_trait]
impl ForecastSource for OwmClient {
    async fn get_forecast(&self, lat: f64, lng: f64) -> Result<ForecastBundle, AppError> {
        self.fetch_onecall(lat, lng).await
    }

    /// One history request per hour in the window. Any failed hour fails the
    /// whole fetch; a partial history would understate moisture.
    async fn get_recent_rain(
        &self,
        lat: f64,
        lng: f64,
        window_hours: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<RecentRainSample>, AppError> {
        let hours: Vec<DateTime<Utc>> = (0..window_hours)
            .map(|k| now - Duration::hours(i64::from(k)))
            .collect();

        let batches: Vec<Vec<RecentRainSample>> = stream::iter(hours)
            .map(|at| self.fetch_rain_at(lat, lng, at))
            .buffer_unordered(HISTORY_CONCURRENCY)
            .try_collect()
            .await?;

        let mut samples: Vec<RecentRainSample> = batches.into_iter().flatten().collect();
        samples.sort_by_key(|s| s.time);
        samples.dedup_by_key(|s| s.time);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn onecall_json() -> serde_json::Value {
        serde_json::json!({
            "lat": 39.74,
            "lon": -104.99,
            "timezone": "America/Denver",
            "timezone_offset": -21600,
            "current": {
                "dt": 1777723200,
                "temp": 58.3,
                "feels_like": 56.1,
                "humidity": 40,
                "wind_speed": 7.2,
                "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }]
            },
            "hourly": [
                {
                    "dt": 1777723200,
                    "temp": 58.3,
                    "wind_speed": 7.2,
                    "wind_gust": 12.0,
                    "pop": 0.25,
                    "rain": { "1h": 2.54 }
                }
            ],
            "daily": [
                {
                    "dt": 1777744800,
                    "sunrise": 1777722000,
                    "sunset": 1777772400,
                    "temp": { "min": 41.0, "max": 66.5 },
                    "wind_speed": 11.0,
                    "pop": 0.8,
                    "rain": 12.7,
                    "weather": [{ "id": 501, "main": "Rain", "description": "moderate rain" }]
                }
            ]
        })
    }

    #[test]
    fn test_parse_onecall_units() {
        let bundle = parse_onecall(&onecall_json()).unwrap();
        assert_eq!(bundle.timezone_offset_secs, -21600);
        assert_eq!(bundle.current.temp_f, 58.3);
        assert_eq!(bundle.current.condition_code, Some(800));

        let hour = &bundle.hourly[0];
        assert!((hour.precip_inches - 0.1).abs() < 1e-9);
        assert!((hour.precip_chance_pct - 25.0).abs() < 1e-9);

        let day = &bundle.daily[0];
        assert!((day.precip_inches - 0.5).abs() < 1e-9);
        assert!((day.precip_chance_pct - 80.0).abs() < 1e-9);
        assert_eq!(day.temp_high_f, 66.5);
        assert_eq!(day.condition.as_deref(), Some("Rain"));
    }

    #[test]
    fn test_parse_onecall_keys_days_by_local_date() {
        // 1777744800 is 2026-05-02T18:00:00Z, 12:00 local at UTC-6
        let bundle = parse_onecall(&onecall_json()).unwrap();
        assert_eq!(
            bundle.daily[0].date,
            NaiveDate::from_ymd_opt(2026, 5, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_onecall_requires_daily() {
        let mut json = onecall_json();
        json["daily"] = serde_json::json!([]);
        assert!(matches!(
            parse_onecall(&json),
            Err(AppError::ExternalServiceError(_))
        ));
    }

    #[test]
    fn test_parse_onecall_rejects_malformed() {
        let json = serde_json::json!({ "current": {} });
        assert!(parse_onecall(&json).is_err());
    }
}
