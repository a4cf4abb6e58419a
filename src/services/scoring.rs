//! Traffic-light scoring of forecast days.
//!
//! Each day is checked against every rule. All matching reasons are kept and
//! the day takes the worst severity among them. With an indoor arena, red
//! footing and rain factors downgrade to yellow; thunderstorms and high wind
//! stay red because they affect getting to and from the barn too.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::db::models::RideScheduleSlot;
use crate::helpers::to_local;
use crate::services::forecast::{CurrentConditions, DayForecast, HourForecast, RecentRainSample};
use crate::services::moisture::{
    estimate_future_moisture, estimate_moisture, MoistureState, TRACE_PRECIP_INCHES,
};
use crate::services::settings::WeatherSettings;

// ---------------------------------------------------------------------------
// Score
// ---------------------------------------------------------------------------

/// Ordered worst-last, so `max` picks the worst severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DayScore {
    Green,
    Yellow,
    Red,
}

impl DayScore {
    pub const ALL: [DayScore; 3] = [DayScore::Green, DayScore::Yellow, DayScore::Red];

    /// 0 = green, 1 = yellow, 2 = red.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayScore::Green => "green",
            DayScore::Yellow => "yellow",
            DayScore::Red => "red",
        }
    }
}

impl fmt::Display for DayScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid day score {0:?}: expected green, yellow or red")]
pub struct ParseScoreError(pub String);

impl FromStr for DayScore {
    type Err = ParseScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(DayScore::Green),
            "yellow" => Ok(DayScore::Yellow),
            "red" => Ok(DayScore::Red),
            other => Err(ParseScoreError(other.to_string())),
        }
    }
}

/// One scored forecast day.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoredDay {
    pub date: NaiveDate,
    pub score: DayScore,
    /// Every rule that raised the score above green
    pub reasons: Vec<String>,
    /// Informational context that did not affect the score
    pub notes: Vec<String>,
    pub forecast: DayForecast,
    pub moisture: MoistureState,
    /// Wind speed used for the wind rules, mph
    pub ride_wind_mph: f64,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub const NOTE_MOISTURE_UNKNOWN: &str =
    "Recent rainfall unavailable; ground conditions not assessed";
pub const NOTE_INDOOR_ARENA: &str =
    "Indoor arena available: footing and rain concerns reduced to caution";

#[derive(Debug, Clone)]
struct Factor {
    severity: DayScore,
    reason: String,
    /// Red factors an indoor arena can downgrade to yellow
    indoor_overridable: bool,
}

impl Factor {
    fn red(reason: String, indoor_overridable: bool) -> Self {
        Self {
            severity: DayScore::Red,
            reason,
            indoor_overridable,
        }
    }

    fn yellow(reason: String) -> Self {
        Self {
            severity: DayScore::Yellow,
            reason,
            indoor_overridable: false,
        }
    }
}

/// Score every forecast day. `daily[i]` is scored with moisture projected
/// `i` days past today.
pub fn score_days(
    daily: &[DayForecast],
    settings: &WeatherSettings,
    recent_rain: &[RecentRainSample],
    current: &CurrentConditions,
    hourly: &[HourForecast],
    ride_slots: &[RideScheduleSlot],
    tz_offset_secs: i32,
) -> Vec<ScoredDay> {
    let today = estimate_moisture(recent_rain, current, settings);

    daily
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let moisture = estimate_future_moisture(&today, i, daily, settings);
            let wind = ride_wind_mph(day, hourly, ride_slots, tz_offset_secs);
            score_day(day, moisture, wind, settings)
        })
        .collect()
}

/// Score a single day given its projected moisture and ride-hours wind.
pub fn score_day(
    day: &DayForecast,
    moisture: MoistureState,
    ride_wind_mph: f64,
    settings: &WeatherSettings,
) -> ScoredDay {
    let mut factors = Vec::new();
    let mut notes = Vec::new();

    // Ground
    if moisture.data_available {
        let m = moisture.current_moisture;
        let cutoff = settings.rain_cutoff_inches;
        if m >= cutoff {
            factors.push(Factor::red(
                format!(
                    "Saturated ground: {:.2}in estimated moisture (cutoff {:.2}in)",
                    m, cutoff
                ),
                true,
            ));
        } else if m >= settings.damp_moisture_ratio * cutoff {
            factors.push(Factor::yellow(format!(
                "Damp ground: {:.2}in estimated moisture (cutoff {:.2}in)",
                m, cutoff
            )));
        } else if m >= TRACE_PRECIP_INCHES {
            notes.push(format!("Ground still drying: ~{:.2}in residual moisture", m));
        }
    } else {
        notes.push(NOTE_MOISTURE_UNKNOWN.to_string());
    }

    // Rain
    let pop = day.precip_chance_pct;
    if pop >= settings.precip_chance_red_pct {
        factors.push(Factor::red(
            format!("Heavy rain likely: {:.0}% chance", pop),
            true,
        ));
    } else if pop >= settings.precip_chance_yellow_pct {
        factors.push(Factor::yellow(format!("Rain possible: {:.0}% chance", pop)));
    }
    if day.precip_inches >= settings.precip_amount_red_inches {
        factors.push(Factor::red(
            format!("Heavy rain forecast: {:.2}in", day.precip_inches),
            true,
        ));
    }
    if day.has_thunderstorm() {
        factors.push(Factor::red("Thunderstorms forecast".to_string(), false));
    }

    // Wind
    if ride_wind_mph > settings.wind_cutoff_mph {
        factors.push(Factor::red(
            format!(
                "High wind: {:.0} mph during ride hours (cutoff {:.0} mph)",
                ride_wind_mph, settings.wind_cutoff_mph
            ),
            false,
        ));
    } else if ride_wind_mph >= settings.wind_caution_ratio * settings.wind_cutoff_mph {
        factors.push(Factor::yellow(format!(
            "Breezy: {:.0} mph during ride hours",
            ride_wind_mph
        )));
    }

    // Temperature
    if day.temp_high_f < settings.cold_alert_temp_f {
        factors.push(Factor::yellow(format!("Cold: high of {:.0}°F", day.temp_high_f)));
    }
    if day.temp_high_f > settings.heat_alert_temp_f {
        factors.push(Factor::yellow(format!("Heat: high of {:.0}°F", day.temp_high_f)));
    }

    if settings.has_indoor_arena {
        let mut downgraded = false;
        for factor in factors.iter_mut() {
            if factor.severity == DayScore::Red && factor.indoor_overridable {
                factor.severity = DayScore::Yellow;
                downgraded = true;
            }
        }
        if downgraded {
            notes.push(NOTE_INDOOR_ARENA.to_string());
        }
    }

    let score = factors
        .iter()
        .map(|f| f.severity)
        .max()
        .unwrap_or(DayScore::Green);

    ScoredDay {
        date: day.date,
        score,
        reasons: factors.into_iter().map(|f| f.reason).collect(),
        notes,
        forecast: day.clone(),
        moisture,
        ride_wind_mph,
    }
}

/// Wind speed that matters for riding on `day`.
///
/// Uses the strongest hourly wind inside that weekday's ride slots, then the
/// strongest hourly wind in daylight, then the daily figure.
pub fn ride_wind_mph(
    day: &DayForecast,
    hourly: &[HourForecast],
    ride_slots: &[RideScheduleSlot],
    tz_offset_secs: i32,
) -> f64 {
    let weekday = day.date.weekday().num_days_from_sunday() as i16;
    let slots: Vec<(NaiveTime, NaiveTime)> = ride_slots
        .iter()
        .filter(|s| s.day_of_week == weekday)
        .map(|s| (s.start_time, s.end_time))
        .collect();

    let same_day = || {
        hourly
            .iter()
            .filter(|h| to_local(h.time, tz_offset_secs).date() == day.date)
    };

    let in_slots = same_day()
        .filter(|h| {
            let t = to_local(h.time, tz_offset_secs).time();
            slots.iter().any(|(start, end)| t >= *start && t < *end)
        })
        .map(|h| h.wind_speed_mph)
        .reduce(f64::max);
    if let Some(wind) = in_slots {
        return wind;
    }

    let in_daylight = same_day()
        .filter(|h| h.time >= day.sunrise && h.time <= day.sunset)
        .map(|h| h.wind_speed_mph)
        .reduce(f64::max);

    in_daylight.unwrap_or(day.wind_speed_mph)
}
