//! Suggested ride window generation.
//!
//! Windows are local wall-clock intervals on non-red days. They come from
//! the weekly ride schedule when the weekday has slots, otherwise from
//! fixed-length blocks laid across daylight. Every survivor lies strictly
//! after sunrise, ends by sunset and overlaps no busy interval.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::RideScheduleSlot;
use crate::helpers::to_local;
use crate::services::scoring::{DayScore, ScoredDay};

/// Length of a synthesized window.
pub const WINDOW_BLOCK_HOURS: u32 = 3;

/// Synthesized blocks start this many hours after the sunrise hour.
pub const FIRST_BLOCK_OFFSET_HOURS: u32 = 1;

/// Time already committed elsewhere, local wall-clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BusyInterval {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BusyInterval {
    /// Half-open overlap: touching endpoints do not conflict.
    pub fn overlaps(&self, date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
        self.date == date && start < self.end && end > self.start
    }
}

/// A window ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NewRideWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub weather_score: DayScore,
    pub weather_notes: Vec<String>,
}

pub fn generate_windows(
    days: &[ScoredDay],
    slots: &[RideScheduleSlot],
    busy: &[BusyInterval],
    tz_offset_secs: i32,
) -> Vec<NewRideWindow> {
    let mut windows = Vec::new();

    for day in days {
        if day.score == DayScore::Red {
            continue;
        }

        let sunrise = to_local(day.forecast.sunrise, tz_offset_secs).time();
        let sunset = to_local(day.forecast.sunset, tz_offset_secs).time();

        let weekday = day.date.weekday().num_days_from_sunday() as i16;
        let mut candidates: Vec<(NaiveTime, NaiveTime)> = slots
            .iter()
            .filter(|s| s.day_of_week == weekday)
            .map(|s| (s.start_time, s.end_time))
            .collect();
        if candidates.is_empty() {
            candidates = daylight_blocks(sunrise, sunset);
        }

        let notes: Vec<String> = day.reasons.iter().chain(day.notes.iter()).cloned().collect();

        for (start, end) in candidates {
            if start <= sunrise || end > sunset || start >= end {
                continue;
            }
            if busy.iter().any(|b| b.overlaps(day.date, start, end)) {
                continue;
            }
            let duplicate = windows.iter().any(|w: &NewRideWindow| {
                w.date == day.date && w.start_time == start && w.end_time == end
            });
            if duplicate {
                continue;
            }
            windows.push(NewRideWindow {
                date: day.date,
                start_time: start,
                end_time: end,
                weather_score: day.score,
                weather_notes: notes.clone(),
            });
        }
    }

    windows
}

/// Back-to-back blocks on whole hours, the last ending no later than the
/// sunset hour.
fn daylight_blocks(sunrise: NaiveTime, sunset: NaiveTime) -> Vec<(NaiveTime, NaiveTime)> {
    let mut blocks = Vec::new();
    let mut start = sunrise.hour() + FIRST_BLOCK_OFFSET_HOURS;
    while start + WINDOW_BLOCK_HOURS <= sunset.hour() {
        let end = start + WINDOW_BLOCK_HOURS;
        if let (Some(s), Some(e)) = (
            NaiveTime::from_hms_opt(start, 0, 0),
            NaiveTime::from_hms_opt(end, 0, 0),
        ) {
            blocks.push((s, e));
        }
        start = end;
    }
    blocks
}
