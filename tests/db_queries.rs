//! Query tests against a real Postgres. Run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use std::sync::{Arc, Mutex};

use barnbook_footing::db::models::RideWindow;
use barnbook_footing::db::queries::{self, NewFootingFeedback, UpsertSnapshotParams};
use barnbook_footing::errors::AppError;
use barnbook_footing::services::accuracy::ActualFooting;
use barnbook_footing::services::calendar::{CalendarSink, NoBusyCalendar};
use barnbook_footing::services::forecast::{
    CurrentConditions, DayForecast, ForecastBundle, ForecastSource, RecentRainSample,
};
use barnbook_footing::services::scoring::DayScore;
use barnbook_footing::services::sync::{sync_ride_windows, SyncDeps};
use barnbook_footing::services::windows::NewRideWindow;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
}

fn window(d: u32, start: u32, end: u32) -> NewRideWindow {
    NewRideWindow {
        date: date(d),
        start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        weather_score: DayScore::Green,
        weather_notes: Vec::new(),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_replace_windows_swaps_whole_set(pool: PgPool) {
    let first = queries::replace_ride_windows(&pool, &[window(2, 7, 10), window(3, 7, 10)])
        .await
        .unwrap();
    assert_eq!(first.current.len(), 2);
    assert!(first.removed.is_empty());

    let kept = &first.current[0];
    queries::set_window_ical_uid(&pool, kept.id, "uid-kept")
        .await
        .unwrap();

    let second = queries::replace_ride_windows(&pool, &[window(2, 7, 10), window(4, 13, 16)])
        .await
        .unwrap();

    let stored = queries::list_ride_windows(&pool).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].date, date(2));
    assert_eq!(stored[0].ical_uid.as_deref(), Some("uid-kept"));
    assert_eq!(stored[1].date, date(4));
    assert_eq!(second.removed.len(), 1);
    assert_eq!(second.removed[0].date, date(3));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_replace_windows_with_empty_set_clears(pool: PgPool) {
    queries::replace_ride_windows(&pool, &[window(2, 7, 10)])
        .await
        .unwrap();
    let replaced = queries::replace_ride_windows(&pool, &[]).await.unwrap();
    assert!(replaced.current.is_empty());
    assert_eq!(replaced.removed.len(), 1);
    assert!(queries::list_ride_windows(&pool).await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_missing_window_returns_none(pool: PgPool) {
    let gone = queries::delete_ride_window(&pool, uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_graded_feedback_uses_latest_entry(pool: PgPool) {
    queries::upsert_snapshot(
        &pool,
        &UpsertSnapshotParams {
            date: date(2),
            score: DayScore::Green,
            moisture_inches: Some(0.1),
            footing_dry_hours_per_inch: 24.0,
            reasons: Vec::new(),
        },
    )
    .await
    .unwrap();

    for actual in [ActualFooting::Good, ActualFooting::Soft] {
        queries::create_feedback(
            &pool,
            &NewFootingFeedback {
                date: date(2),
                ride_session_id: None,
                actual_footing: actual,
            },
        )
        .await
        .unwrap();
    }
    // No snapshot for this one
    queries::create_feedback(
        &pool,
        &NewFootingFeedback {
            date: date(3),
            ride_session_id: None,
            actual_footing: ActualFooting::Good,
        },
    )
    .await
    .unwrap();

    let graded = queries::get_graded_feedback(&pool, None).await.unwrap();
    assert_eq!(graded.len(), 1);
    assert_eq!(graded[0].actual, ActualFooting::Soft);
    assert_eq!(graded[0].predicted, DayScore::Green);
    assert_eq!(graded[0].dry_hours_used, 24.0);
    assert!(graded[0].moisture_known);

    let newest = queries::get_feedback_for_date(&pool, date(2)).await.unwrap();
    assert_eq!(newest[0].actual_footing, "soft");

    assert_eq!(queries::count_unmatched_feedback_dates(&pool).await.unwrap(), 1);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dry_rate_cas_rejects_stale_version(pool: PgPool) {
    let settings = queries::get_settings(&pool).await.unwrap();
    assert!(queries::cas_update_dry_rate(&pool, 30.0, settings.version)
        .await
        .unwrap());
    assert!(!queries::cas_update_dry_rate(&pool, 40.0, settings.version)
        .await
        .unwrap());

    let after = queries::get_settings(&pool).await.unwrap();
    assert_eq!(after.footing_dry_hours_per_inch, 30.0);
    assert_eq!(after.version, settings.version + 1);
}

// ---------------------------------------------------------------------------
// Window sync
// ---------------------------------------------------------------------------

fn tomorrow() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(1)
}

fn utc(date: NaiveDate, hour: u32) -> DateTime<Utc> {
    date.and_hms_opt(hour, 0, 0).unwrap().and_utc()
}

/// One calm dry day tomorrow, sunrise 06:00 and sunset 18:00 UTC.
struct DryForecast;

#[async_trait]
impl ForecastSource for DryForecast {
    async fn get_forecast(&self, _lat: f64, _lng: f64) -> Result<ForecastBundle, AppError> {
        let day = tomorrow();
        Ok(ForecastBundle {
            current: CurrentConditions {
                observed_at: Utc::now(),
                temp_f: 62.0,
                feels_like_f: None,
                humidity_pct: None,
                wind_speed_mph: 4.0,
                wind_gust_mph: None,
                condition: Some("Clear".to_string()),
                condition_code: Some(800),
            },
            daily: vec![DayForecast {
                date: day,
                sunrise: utc(day, 6),
                sunset: utc(day, 18),
                temp_high_f: 68.0,
                temp_low_f: 45.0,
                precip_chance_pct: 0.0,
                precip_inches: 0.0,
                wind_speed_mph: 5.0,
                wind_gust_mph: None,
                condition: Some("Clear".to_string()),
                condition_code: Some(800),
            }],
            hourly: Vec::new(),
            timezone_offset_secs: 0,
        })
    }

    async fn get_recent_rain(
        &self,
        _lat: f64,
        _lng: f64,
        _window_hours: u32,
        _now: DateTime<Utc>,
    ) -> Result<Vec<RecentRainSample>, AppError> {
        Ok(Vec::new())
    }
}

/// Rejects every push and records removals.
#[derive(Default)]
struct OfflineSink {
    removed: Mutex<Vec<String>>,
}

#[async_trait]
impl CalendarSink for OfflineSink {
    async fn push_window(&self, _window: &RideWindow) -> Result<String, AppError> {
        Err(AppError::ExternalServiceError("calendar offline".to_string()))
    }

    async fn remove_window(&self, uid: &str) -> Result<(), AppError> {
        self.removed.lock().unwrap().push(uid.to_string());
        Ok(())
    }
}

async fn configure_location(pool: &PgPool) {
    let mut settings = queries::get_settings(pool).await.unwrap();
    let version = settings.version;
    settings.location_lat = Some(39.74);
    settings.location_lng = Some(-104.99);
    queries::update_settings(pool, &settings, version)
        .await
        .unwrap()
        .unwrap();
}

fn deps(pool: &PgPool, sink: Option<Arc<dyn CalendarSink>>) -> SyncDeps {
    SyncDeps {
        pool: pool.clone(),
        forecast: Some(Arc::new(DryForecast)),
        busy: Arc::new(NoBusyCalendar),
        sink,
        horizon_days: 7,
        retention_days: 90,
        run_lock: Arc::new(tokio::sync::Mutex::new(())),
    }
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_sync_keeps_windows_when_calendar_push_fails(pool: PgPool) {
    configure_location(&pool).await;

    // A stale pushed window the new pass will not produce
    let stale = NewRideWindow {
        date: tomorrow(),
        start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        weather_score: DayScore::Green,
        weather_notes: Vec::new(),
    };
    let seeded = queries::replace_ride_windows(&pool, &[stale]).await.unwrap();
    queries::set_window_ical_uid(&pool, seeded.current[0].id, "uid-stale")
        .await
        .unwrap();

    let sink = Arc::new(OfflineSink::default());
    let summary = sync_ride_windows(&deps(&pool, Some(sink.clone())))
        .await
        .unwrap();

    // 07-10, 10-13 and 13-16 fit between sunrise and sunset
    assert_eq!(summary.windows, 3);
    assert_eq!(summary.pushed, 0);
    assert_eq!(summary.push_failures, 3);
    assert_eq!(summary.removed, 1);
    assert_eq!(*sink.removed.lock().unwrap(), vec!["uid-stale".to_string()]);

    let stored = queries::list_ride_windows(&pool).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|w| w.ical_uid.is_none()));
    assert!(stored.iter().all(|w| w.date == tomorrow()));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_approved_window_is_not_suggested_again(pool: PgPool) {
    configure_location(&pool).await;
    let deps = deps(&pool, None);

    sync_ride_windows(&deps).await.unwrap();
    let before = queries::list_ride_windows(&pool).await.unwrap();
    assert_eq!(before.len(), 3);

    let approved = queries::approve_ride_window(&pool, before[0].id)
        .await
        .unwrap()
        .unwrap();

    let summary = sync_ride_windows(&deps).await.unwrap();
    assert_eq!(summary.windows, 2);

    let after = queries::list_ride_windows(&pool).await.unwrap();
    assert_eq!(after.len(), 2);
    assert!(after
        .iter()
        .all(|w| !(w.date == approved.date && w.start_time == approved.start_time)));

    let busy = queries::get_approved_intervals(&pool, tomorrow(), tomorrow())
        .await
        .unwrap();
    assert_eq!(busy.len(), 1);
    assert_eq!(busy[0].start, approved.start_time);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_approve_missing_window_returns_none(pool: PgPool) {
    let gone = queries::approve_ride_window(&pool, uuid::Uuid::new_v4())
        .await
        .unwrap();
    assert!(gone.is_none());
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL"]
async fn test_graded_feedback_flags_unknown_moisture(pool: PgPool) {
    queries::upsert_snapshot(
        &pool,
        &UpsertSnapshotParams {
            date: date(5),
            score: DayScore::Green,
            moisture_inches: None,
            footing_dry_hours_per_inch: 24.0,
            reasons: Vec::new(),
        },
    )
    .await
    .unwrap();
    queries::create_feedback(
        &pool,
        &NewFootingFeedback {
            date: date(5),
            ride_session_id: None,
            actual_footing: ActualFooting::Soft,
        },
    )
    .await
    .unwrap();

    let graded = queries::get_graded_feedback(&pool, None).await.unwrap();
    assert_eq!(graded.len(), 1);
    assert!(!graded[0].moisture_known);
}
