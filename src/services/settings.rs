//! Per-deployment weather settings.
//!
//! A single versioned row holds every tunable the engine reads. User edits
//! go through `WeatherSettings::apply`, which validates the merged result
//! before anything is written. The tuner writes only
//! `footing_dry_hours_per_inch`, conditioned on `version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::services::tuner::{MAX_DRY_HOURS_PER_INCH, MIN_DRY_HOURS_PER_INCH};

pub const DEFAULT_RAIN_CUTOFF_INCHES: f64 = 0.5;
pub const DEFAULT_RAIN_WINDOW_HOURS: i32 = 48;
pub const DEFAULT_COLD_ALERT_TEMP_F: f64 = 32.0;
pub const DEFAULT_HEAT_ALERT_TEMP_F: f64 = 90.0;
pub const DEFAULT_WIND_CUTOFF_MPH: f64 = 25.0;
pub const DEFAULT_DRY_HOURS_PER_INCH: f64 = 24.0;
pub const DEFAULT_PRECIP_CHANCE_RED_PCT: f64 = 70.0;
pub const DEFAULT_PRECIP_CHANCE_YELLOW_PCT: f64 = 40.0;
pub const DEFAULT_PRECIP_AMOUNT_RED_INCHES: f64 = 0.5;
pub const DEFAULT_DAMP_MOISTURE_RATIO: f64 = 0.5;
pub const DEFAULT_WIND_CAUTION_RATIO: f64 = 0.75;

/// Upper bound on the rain lookback; each hour costs one history request.
pub const MAX_RAIN_WINDOW_HOURS: i32 = 168;

/// Weather settings singleton.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WeatherSettings {
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    /// Moisture depth at or above which ground counts as saturated
    pub rain_cutoff_inches: f64,
    /// Lookback horizon for recent rain
    pub rain_window_hours: i32,
    pub cold_alert_temp_f: f64,
    pub heat_alert_temp_f: f64,
    pub wind_cutoff_mph: f64,
    /// Indoor riding stays viable when outdoor footing is poor
    pub has_indoor_arena: bool,
    /// Hours of drying that remove one inch of moisture (self-tuned)
    pub footing_dry_hours_per_inch: f64,
    /// Daily precipitation chance (%) at or above which a day is red
    pub precip_chance_red_pct: f64,
    /// Daily precipitation chance (%) at or above which a day is yellow
    pub precip_chance_yellow_pct: f64,
    /// Forecast daily rain depth at or above which a day is red
    pub precip_amount_red_inches: f64,
    /// Fraction of the rain cutoff at which ground counts as damp (yellow)
    pub damp_moisture_ratio: f64,
    /// Fraction of the wind cutoff at which ride hours count as breezy (yellow)
    pub wind_caution_ratio: f64,
    /// Incremented on every write
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            location_lat: None,
            location_lng: None,
            rain_cutoff_inches: DEFAULT_RAIN_CUTOFF_INCHES,
            rain_window_hours: DEFAULT_RAIN_WINDOW_HOURS,
            cold_alert_temp_f: DEFAULT_COLD_ALERT_TEMP_F,
            heat_alert_temp_f: DEFAULT_HEAT_ALERT_TEMP_F,
            wind_cutoff_mph: DEFAULT_WIND_CUTOFF_MPH,
            has_indoor_arena: false,
            footing_dry_hours_per_inch: DEFAULT_DRY_HOURS_PER_INCH,
            precip_chance_red_pct: DEFAULT_PRECIP_CHANCE_RED_PCT,
            precip_chance_yellow_pct: DEFAULT_PRECIP_CHANCE_YELLOW_PCT,
            precip_amount_red_inches: DEFAULT_PRECIP_AMOUNT_RED_INCHES,
            damp_moisture_ratio: DEFAULT_DAMP_MOISTURE_RATIO,
            wind_caution_ratio: DEFAULT_WIND_CAUTION_RATIO,
            version: 0,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SettingsUpdate {
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub rain_cutoff_inches: Option<f64>,
    pub rain_window_hours: Option<i32>,
    pub cold_alert_temp_f: Option<f64>,
    pub heat_alert_temp_f: Option<f64>,
    pub wind_cutoff_mph: Option<f64>,
    pub has_indoor_arena: Option<bool>,
    pub footing_dry_hours_per_inch: Option<f64>,
    pub precip_chance_red_pct: Option<f64>,
    pub precip_chance_yellow_pct: Option<f64>,
    pub precip_amount_red_inches: Option<f64>,
    pub damp_moisture_ratio: Option<f64>,
    pub wind_caution_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("precip_chance_yellow_pct ({yellow}) must not exceed precip_chance_red_pct ({red})")]
    InvertedPrecipThresholds { yellow: f64, red: f64 },
}

impl WeatherSettings {
    /// Site coordinates, or `NotConfigured` if either is missing.
    pub fn location(&self) -> Result<(f64, f64), AppError> {
        match (self.location_lat, self.location_lng) {
            (Some(lat), Some(lng)) => Ok((lat, lng)),
            _ => Err(AppError::NotConfigured(
                "Weather location is not set; update location_lat and location_lng".to_string(),
            )),
        }
    }

    /// Drying rate safe to divide by. Falls back to the default if the stored
    /// value is somehow invalid.
    pub fn effective_dry_rate(&self) -> f64 {
        let rate = self.footing_dry_hours_per_inch;
        if rate.is_finite() && rate > 0.0 {
            rate
        } else {
            tracing::warn!(
                "Invalid footing_dry_hours_per_inch {}, using default {}",
                rate,
                DEFAULT_DRY_HOURS_PER_INCH
            );
            DEFAULT_DRY_HOURS_PER_INCH
        }
    }

    /// Merge a partial update and validate the result.
    pub fn apply(&self, update: &SettingsUpdate) -> Result<WeatherSettings, SettingsError> {
        let merged = WeatherSettings {
            location_lat: update.location_lat.or(self.location_lat),
            location_lng: update.location_lng.or(self.location_lng),
            rain_cutoff_inches: update.rain_cutoff_inches.unwrap_or(self.rain_cutoff_inches),
            rain_window_hours: update.rain_window_hours.unwrap_or(self.rain_window_hours),
            cold_alert_temp_f: update.cold_alert_temp_f.unwrap_or(self.cold_alert_temp_f),
            heat_alert_temp_f: update.heat_alert_temp_f.unwrap_or(self.heat_alert_temp_f),
            wind_cutoff_mph: update.wind_cutoff_mph.unwrap_or(self.wind_cutoff_mph),
            has_indoor_arena: update.has_indoor_arena.unwrap_or(self.has_indoor_arena),
            footing_dry_hours_per_inch: update
                .footing_dry_hours_per_inch
                .unwrap_or(self.footing_dry_hours_per_inch),
            precip_chance_red_pct: update
                .precip_chance_red_pct
                .unwrap_or(self.precip_chance_red_pct),
            precip_chance_yellow_pct: update
                .precip_chance_yellow_pct
                .unwrap_or(self.precip_chance_yellow_pct),
            precip_amount_red_inches: update
                .precip_amount_red_inches
                .unwrap_or(self.precip_amount_red_inches),
            damp_moisture_ratio: update.damp_moisture_ratio.unwrap_or(self.damp_moisture_ratio),
            wind_caution_ratio: update.wind_caution_ratio.unwrap_or(self.wind_caution_ratio),
            version: self.version,
            updated_at: self.updated_at,
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(lat) = self.location_lat {
            in_range("location_lat", lat, -90.0, 90.0)?;
        }
        if let Some(lng) = self.location_lng {
            in_range("location_lng", lng, -180.0, 180.0)?;
        }
        positive("rain_cutoff_inches", self.rain_cutoff_inches)?;
        in_range(
            "rain_window_hours",
            f64::from(self.rain_window_hours),
            1.0,
            f64::from(MAX_RAIN_WINDOW_HOURS),
        )?;
        finite("cold_alert_temp_f", self.cold_alert_temp_f)?;
        finite("heat_alert_temp_f", self.heat_alert_temp_f)?;
        positive("wind_cutoff_mph", self.wind_cutoff_mph)?;
        positive("footing_dry_hours_per_inch", self.footing_dry_hours_per_inch)?;
        in_range(
            "footing_dry_hours_per_inch",
            self.footing_dry_hours_per_inch,
            MIN_DRY_HOURS_PER_INCH,
            MAX_DRY_HOURS_PER_INCH,
        )?;
        in_range("precip_chance_red_pct", self.precip_chance_red_pct, 0.0, 100.0)?;
        in_range(
            "precip_chance_yellow_pct",
            self.precip_chance_yellow_pct,
            0.0,
            100.0,
        )?;
        if self.precip_chance_yellow_pct > self.precip_chance_red_pct {
            return Err(SettingsError::InvertedPrecipThresholds {
                yellow: self.precip_chance_yellow_pct,
                red: self.precip_chance_red_pct,
            });
        }
        positive("precip_amount_red_inches", self.precip_amount_red_inches)?;
        fraction("damp_moisture_ratio", self.damp_moisture_ratio)?;
        fraction("wind_caution_ratio", self.wind_caution_ratio)?;
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), SettingsError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SettingsError::NotFinite { field })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), SettingsError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::NotPositive { field, value })
    }
}

/// In `(0, 1]`.
fn fraction(field: &'static str, value: f64) -> Result<(), SettingsError> {
    positive(field, value)?;
    in_range(field, value, 0.0, 1.0)
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), SettingsError> {
    finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
