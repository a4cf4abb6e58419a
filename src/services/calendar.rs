//! External calendar collaborators.
//!
//! `BusyCalendar` supplies intervals that suggested windows must avoid.
//! `CalendarSink` receives stored windows as events. The CalDAV sink writes
//! one `.ics` resource per window with a deterministic UID, so pushing the
//! same window twice overwrites rather than duplicates.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::CONTENT_TYPE;

use crate::config::CalDavConfig;
use crate::db::models::RideWindow;
use crate::errors::AppError;
use crate::services::windows::BusyInterval;

#[async_trait]
pub trait BusyCalendar: Send + Sync {
    /// Busy intervals on dates in `[start, end]`, local wall-clock.
    async fn busy_intervals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AppError>;
}

/// No external calendar; nothing is busy.
#[derive(Debug, Clone, Default)]
pub struct NoBusyCalendar;

#[async_trait]
impl BusyCalendar for NoBusyCalendar {
    async fn busy_intervals(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<BusyInterval>, AppError> {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait CalendarSink: Send + Sync {
    /// Create or overwrite the event for `window`, returning its UID.
    async fn push_window(&self, window: &RideWindow) -> Result<String, AppError>;

    /// Remove a previously pushed event. Removing a missing event succeeds.
    async fn remove_window(&self, uid: &str) -> Result<(), AppError>;
}

/// Stable event UID for a window's date and times.
pub fn window_uid(window: &RideWindow) -> String {
    format!(
        "barnbook-ride-{}-{}-{}",
        window.date.format("%Y%m%d"),
        window.start_time.format("%H%M"),
        window.end_time.format("%H%M")
    )
}

/// Escape a TEXT value per RFC 5545 §3.3.11.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Single-event iCalendar document. Start and end are floating local times.
pub fn build_vevent(window: &RideWindow, uid: &str, dtstamp: DateTime<Utc>) -> String {
    let day = window.date.format("%Y%m%d");
    let description = window
        .weather_notes
        .iter()
        .map(|n| escape_text(n))
        .collect::<Vec<_>>()
        .join("\\n");

    let lines = [
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Barnbook//Footing Engine//EN".to_string(),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", uid),
        format!("DTSTAMP:{}", dtstamp.format("%Y%m%dT%H%M%SZ")),
        format!("DTSTART:{}T{}", day, window.start_time.format("%H%M%S")),
        format!("DTEND:{}T{}", day, window.end_time.format("%H%M%S")),
        format!("SUMMARY:Ride window ({})", window.weather_score),
        format!("DESCRIPTION:{}", description),
        "TRANSP:TRANSPARENT".to_string(),
        "END:VEVENT".to_string(),
        "END:VCALENDAR".to_string(),
    ];

    let mut doc = lines.join("\r\n");
    doc.push_str("\r\n");
    doc
}

/// CalDAV collection sink.
#[derive(Debug, Clone)]
pub struct CalDavSink {
    client: reqwest::Client,
    collection_url: String,
    username: String,
    password: String,
}

impl CalDavSink {
    pub fn new(config: &CalDavConfig, timeout: std::time::Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            collection_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn resource_url(&self, uid: &str) -> String {
        format!("{}/{}.ics", self.collection_url, uid)
    }
}

#[async_trait]
impl CalendarSink for CalDavSink {
    async fn push_window(&self, window: &RideWindow) -> Result<String, AppError> {
        let uid = window_uid(window);
        let body = build_vevent(window, &uid, Utc::now());

        let response = self
            .client
            .put(self.resource_url(&uid))
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("CalDAV PUT failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "CalDAV PUT returned HTTP {}",
                response.status()
            )));
        }
        Ok(uid)
    }

    async fn remove_window(&self, uid: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(self.resource_url(uid))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("CalDAV DELETE failed: {}", e)))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(AppError::ExternalServiceError(format!(
                "CalDAV DELETE returned HTTP {}",
                status
            )))
        }
    }
}
