//! Suggested ride window sync.
//!
//! Each run scores the forecast, generates windows for the horizon,
//! replaces the stored set in one transaction and pushes new windows to the
//! calendar sink. Windows dropped by the replacement are removed from the
//! calendar too. Approved windows keep their calendar event and block their
//! slot in later runs.
//!
//! Architecture:
//! - A background loop runs a sync every `SYNC_INTERVAL_SECS`
//! - The same sync can be triggered over HTTP; a mutex keeps runs serial
//! - State is in-memory (`Arc<RwLock<SyncState>>`) and exposed by the
//!   status endpoint

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use utoipa::ToSchema;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::calendar::{BusyCalendar, CalendarSink};
use crate::services::forecast::ForecastSource;
use crate::services::ride_day::run_ride_day_pass;
use crate::services::windows::generate_windows;

// ---------------------------------------------------------------------------
// Sync state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// What one sync run did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SyncSummary {
    pub scored_days: usize,
    pub windows: usize,
    pub pushed: usize,
    pub push_failures: usize,
    pub removed: usize,
}

/// Window sync worker state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncState {
    pub active: bool,
    pub interval_secs: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub total_runs: u64,
    /// "ok", "not_configured" or "error"
    pub last_result: Option<String>,
    pub last_error: Option<String>,
    pub last_summary: Option<SyncSummary>,
}

impl SyncState {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            active: false,
            interval_secs,
            next_run_at: None,
            last_run_at: None,
            last_run_duration_ms: None,
            total_runs: 0,
            last_result: None,
            last_error: None,
            last_summary: None,
        }
    }

    pub fn record(
        &mut self,
        started: DateTime<Utc>,
        duration_ms: u64,
        result: &Result<SyncSummary, AppError>,
    ) {
        self.total_runs += 1;
        self.last_run_at = Some(started);
        self.last_run_duration_ms = Some(duration_ms);
        match result {
            Ok(summary) => {
                self.last_result = Some("ok".to_string());
                self.last_error = None;
                self.last_summary = Some(summary.clone());
            }
            Err(AppError::NotConfigured(msg)) => {
                self.last_result = Some("not_configured".to_string());
                self.last_error = Some(msg.clone());
            }
            Err(e) => {
                self.last_result = Some("error".to_string());
                self.last_error = Some(e.to_string());
            }
        }
    }
}

/// Shared sync state handle.
pub type SharedSyncState = Arc<RwLock<SyncState>>;

/// Everything a sync run talks to.
#[derive(Clone)]
pub struct SyncDeps {
    pub pool: PgPool,
    pub forecast: Option<Arc<dyn ForecastSource>>,
    pub busy: Arc<dyn BusyCalendar>,
    pub sink: Option<Arc<dyn CalendarSink>>,
    /// Days starting today covered by each run
    pub horizon_days: u32,
    pub retention_days: u32,
    pub run_lock: Arc<Mutex<()>>,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Run one complete window sync.
///
/// Approved windows count as busy, so an approval is never suggested again.
/// A busy-calendar failure fails the run. Calendar push failures only leave
/// the window without an `ical_uid`.
pub async fn sync_ride_windows(deps: &SyncDeps) -> Result<SyncSummary, AppError> {
    let _guard = deps.run_lock.lock().await;

    let pass = run_ride_day_pass(&deps.pool, deps.forecast.as_deref(), deps.retention_days).await?;

    let days: Vec<_> = pass
        .days
        .iter()
        .take(deps.horizon_days as usize)
        .cloned()
        .collect();

    let busy = match (days.first(), days.last()) {
        (Some(first), Some(last)) => {
            let mut busy = deps.busy.busy_intervals(first.date, last.date).await?;
            busy.extend(queries::get_approved_intervals(&deps.pool, first.date, last.date).await?);
            busy
        }
        _ => Vec::new(),
    };

    let windows = generate_windows(&days, &pass.schedule, &busy, pass.timezone_offset_secs);
    let replaced = queries::replace_ride_windows(&deps.pool, &windows).await?;

    let mut summary = SyncSummary {
        scored_days: days.len(),
        windows: replaced.current.len(),
        ..SyncSummary::default()
    };

    if let Some(sink) = &deps.sink {
        for window in replaced.current.iter().filter(|w| w.ical_uid.is_none()) {
            match sink.push_window(window).await {
                Ok(uid) => {
                    if let Err(e) = queries::set_window_ical_uid(&deps.pool, window.id, &uid).await
                    {
                        tracing::warn!("Failed to record ical_uid for window {}: {}", window.id, e);
                    }
                    summary.pushed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Calendar push failed for {} {}-{}: {}",
                        window.date,
                        window.start_time,
                        window.end_time,
                        e
                    );
                    summary.push_failures += 1;
                }
            }
        }

        for window in &replaced.removed {
            if let Some(uid) = &window.ical_uid {
                match sink.remove_window(uid).await {
                    Ok(()) => summary.removed += 1,
                    Err(e) => tracing::warn!("Calendar remove failed for {}: {}", uid, e),
                }
            }
        }
    }

    match queries::prune_approved_windows(&deps.pool).await {
        Ok(0) => {}
        Ok(n) => tracing::debug!("Pruned {} past approvals", n),
        Err(e) => tracing::warn!("Approval pruning failed: {}", e),
    }

    tracing::info!(
        "Window sync: {} days, {} windows, {} pushed, {} push failures, {} removed",
        summary.scored_days,
        summary.windows,
        summary.pushed,
        summary.push_failures,
        summary.removed
    );

    Ok(summary)
}

// ---------------------------------------------------------------------------
// Background loop
// ---------------------------------------------------------------------------

/// Run the background window sync. This function never returns (runs until
/// process exit).
///
/// Should be spawned via `tokio::spawn(run_window_sync(...))`.
pub async fn run_window_sync(deps: SyncDeps, state: SharedSyncState, interval: std::time::Duration) {
    tracing::info!("Window sync worker started (every {}s)", interval.as_secs());
    state.write().await.active = true;

    loop {
        let started = Utc::now();
        let result = sync_ride_windows(&deps).await;
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as u64;

        match &result {
            Ok(_) => {}
            Err(AppError::NotConfigured(msg)) => {
                tracing::debug!("Window sync skipped: {}", msg)
            }
            Err(e) => tracing::error!("Window sync failed: {}", e),
        }

        {
            let mut s = state.write().await;
            s.record(started, elapsed, &result);
            s.next_run_at = Some(
                Utc::now() + Duration::from_std(interval).unwrap_or_else(|_| Duration::hours(3)),
            );
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_success() {
        let mut state = SyncState::new(60);
        let summary = SyncSummary {
            scored_days: 7,
            windows: 12,
            pushed: 12,
            ..SyncSummary::default()
        };
        state.record(Utc::now(), 42, &Ok(summary.clone()));
        assert_eq!(state.total_runs, 1);
        assert_eq!(state.last_result.as_deref(), Some("ok"));
        assert_eq!(state.last_summary, Some(summary));
        assert_eq!(state.last_run_duration_ms, Some(42));
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_record_not_configured_keeps_last_summary() {
        let mut state = SyncState::new(60);
        state.record(Utc::now(), 5, &Ok(SyncSummary::default()));
        state.record(
            Utc::now(),
            1,
            &Err(AppError::NotConfigured("no location".to_string())),
        );
        assert_eq!(state.total_runs, 2);
        assert_eq!(state.last_result.as_deref(), Some("not_configured"));
        assert_eq!(state.last_error.as_deref(), Some("no location"));
        assert!(state.last_summary.is_some());
    }

    #[test]
    fn test_record_error() {
        let mut state = SyncState::new(60);
        state.record(
            Utc::now(),
            1,
            &Err(AppError::ExternalServiceError("calendar down".to_string())),
        );
        assert_eq!(state.last_result.as_deref(), Some("error"));
        assert!(state.last_error.unwrap().contains("calendar down"));
    }
}
