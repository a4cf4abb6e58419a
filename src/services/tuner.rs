//! Self-tuning of the footing drying rate.
//!
//! Graded feedback under the current rate is reduced to a bias in
//! `[-1, 1]`: positive when the ground keeps turning out wetter than
//! predicted. A bias past the threshold moves the rate one fixed step in
//! the corrective direction. Only samples graded under the rate in effect
//! count, so a change is never driven twice by the same evidence.
//!
//! Tuning runs on a single background worker fed by a bounded channel.
//! Feedback submission enqueues without waiting; queued requests coalesce
//! into one pass.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::f64_to_decimal;
use crate::services::accuracy::{GradedFeedback, Outcome};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lower bound for `footing_dry_hours_per_inch`.
pub const MIN_DRY_HOURS_PER_INCH: f64 = 2.0;

/// Upper bound for `footing_dry_hours_per_inch`.
pub const MAX_DRY_HOURS_PER_INCH: f64 = 96.0;

/// Rates are stored as NUMERIC(7, 3); equal at this precision means same rate.
const RATE_DECIMAL_PLACES: u32 = 3;

/// Queue depth for tuning requests.
pub const TUNER_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    pub min_samples: usize,
    pub bias_threshold: f64,
    pub step_fraction: f64,
    pub window_days: i64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            bias_threshold: 0.6,
            step_fraction: 0.1,
            window_days: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TuneDecision {
    InsufficientData { samples: usize },
    Unbiased { bias: f64, samples: usize },
    Adjust {
        from: f64,
        to: f64,
        bias: f64,
        samples: usize,
    },
    /// Bias calls for a change but the rate is already clamped
    AtLimit { rate: f64, bias: f64 },
    /// Current or computed rate is unusable; nothing is written
    Anomaly { rate: f64 },
    /// Settings changed between read and write; nothing is written
    Conflict { expected_version: i64 },
}

impl fmt::Display for TuneDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuneDecision::InsufficientData { samples } => {
                write!(f, "insufficient data ({} samples)", samples)
            }
            TuneDecision::Unbiased { bias, samples } => {
                write!(f, "no adjustment (bias {:.2} over {} samples)", bias, samples)
            }
            TuneDecision::Adjust {
                from,
                to,
                bias,
                samples,
            } => write!(
                f,
                "adjusted {:.2} -> {:.2} h/in (bias {:.2} over {} samples)",
                from, to, bias, samples
            ),
            TuneDecision::AtLimit { rate, bias } => {
                write!(f, "at limit {:.2} h/in (bias {:.2})", rate, bias)
            }
            TuneDecision::Anomaly { rate } => write!(f, "anomalous rate {}", rate),
            TuneDecision::Conflict { expected_version } => {
                write!(f, "settings changed concurrently (expected version {})", expected_version)
            }
        }
    }
}

fn stored_rate(rate: f64) -> rust_decimal::Decimal {
    f64_to_decimal(rate, RATE_DECIMAL_PLACES)
}

/// Pure tuning decision over graded feedback.
///
/// Only predictions that used moisture under the current rate count. The
/// result only ever moves the rate in the corrective direction; a clamp that
/// would move it the other way is reported as `AtLimit`.
pub fn decide_adjustment(
    graded: &[GradedFeedback],
    current_rate: f64,
    config: &TunerConfig,
) -> TuneDecision {
    if !current_rate.is_finite() || current_rate <= 0.0 {
        return TuneDecision::Anomaly { rate: current_rate };
    }

    let current = stored_rate(current_rate);
    let relevant: Vec<Outcome> = graded
        .iter()
        .filter(|g| g.moisture_known && stored_rate(g.dry_hours_used) == current)
        .map(|g| g.outcome())
        .collect();
    let samples = relevant.len();
    if samples < config.min_samples || samples == 0 {
        return TuneDecision::InsufficientData { samples };
    }

    let too_dry = relevant.iter().filter(|o| **o == Outcome::TooDry).count() as f64;
    let too_wet = relevant.iter().filter(|o| **o == Outcome::TooWet).count() as f64;
    let bias = (too_dry - too_wet) / samples as f64;

    let target = if bias >= config.bias_threshold {
        current_rate * (1.0 + config.step_fraction)
    } else if bias <= -config.bias_threshold {
        current_rate * (1.0 - config.step_fraction)
    } else {
        return TuneDecision::Unbiased { bias, samples };
    };

    if !target.is_finite() || target <= 0.0 {
        return TuneDecision::Anomaly { rate: target };
    }

    let clamped = target.clamp(MIN_DRY_HOURS_PER_INCH, MAX_DRY_HOURS_PER_INCH);
    let corrective = if bias > 0.0 {
        stored_rate(clamped) > current
    } else {
        stored_rate(clamped) < current
    };
    if !corrective {
        return TuneDecision::AtLimit {
            rate: current_rate,
            bias,
        };
    }

    TuneDecision::Adjust {
        from: current_rate,
        to: clamped,
        bias,
        samples,
    }
}

/// Load recent feedback, decide, and apply with compare-and-swap on the
/// settings version.
pub async fn check_and_tune_drying_rate(
    pool: &PgPool,
    config: &TunerConfig,
) -> Result<TuneDecision, AppError> {
    let settings = queries::get_settings(pool).await?;
    let since = Utc::now().date_naive() - Duration::days(config.window_days);
    let graded = queries::get_graded_feedback(pool, Some(since)).await?;

    let decision = decide_adjustment(&graded, settings.footing_dry_hours_per_inch, config);

    match decision {
        TuneDecision::Adjust { to, .. } => {
            let applied = queries::cas_update_dry_rate(pool, to, settings.version).await?;
            if !applied {
                tracing::info!(
                    "Tuner: settings version {} changed before write, skipping",
                    settings.version
                );
                return Ok(TuneDecision::Conflict {
                    expected_version: settings.version,
                });
            }
            tracing::info!("Tuner: {}", decision);
        }
        TuneDecision::Anomaly { rate } => {
            tracing::warn!("Tuner: refusing anomalous drying rate {}", rate);
        }
        _ => tracing::debug!("Tuner: {}", decision),
    }

    Ok(decision)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TuneRequest {
    pub requested_at: DateTime<Utc>,
}

/// Cloneable sender side of the tuning queue.
#[derive(Debug, Clone)]
pub struct TunerHandle {
    tx: mpsc::Sender<TuneRequest>,
}

impl TunerHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TuneRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a tuning pass without waiting. Returns false when the request
    /// was dropped; a full queue already has a pending pass.
    pub fn try_request(&self) -> bool {
        let request = TuneRequest {
            requested_at: Utc::now(),
        };
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Tuner queue full, request coalesced");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Tuner worker is not running, request dropped");
                false
            }
        }
    }
}

/// Tuner worker state, exposed via the status endpoint.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct TunerState {
    pub active: bool,
    pub total_runs: u64,
    pub requests_received: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub last_decision: Option<String>,
    pub last_error: Option<String>,
    pub last_adjusted_at: Option<DateTime<Utc>>,
}

pub type SharedTunerState = Arc<RwLock<TunerState>>;

/// Run the tuner worker until every `TunerHandle` is dropped.
///
/// Should be spawned via `tokio::spawn(run_tuner(...))`.
pub async fn run_tuner(
    pool: PgPool,
    mut rx: mpsc::Receiver<TuneRequest>,
    state: SharedTunerState,
    config: TunerConfig,
) {
    tracing::info!("Tuner worker started");
    state.write().await.active = true;

    while let Some(first) = rx.recv().await {
        let mut received = 1u64;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        tracing::debug!(
            "Tuner: running pass for {} request(s), first at {}",
            received,
            first.requested_at
        );

        let started = Utc::now();
        let result = check_and_tune_drying_rate(&pool, &config).await;
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as u64;

        let mut s = state.write().await;
        s.total_runs += 1;
        s.requests_received += received;
        s.last_run_at = Some(started);
        s.last_run_duration_ms = Some(elapsed);
        match result {
            Ok(decision) => {
                if matches!(decision, TuneDecision::Adjust { .. }) {
                    s.last_adjusted_at = Some(started);
                }
                s.last_decision = Some(decision.to_string());
                s.last_error = None;
            }
            Err(e) => {
                tracing::error!("Tuner pass failed: {}", e);
                s.last_error = Some(e.to_string());
            }
        }
    }

    state.write().await.active = false;
    tracing::info!("Tuner worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::accuracy::ActualFooting;
    use crate::services::forecast::fixtures::date;
    use crate::services::scoring::DayScore;

    fn graded(predicted: DayScore, actual: ActualFooting, rate: f64) -> GradedFeedback {
        GradedFeedback {
            date: date(2026, 5, 2),
            predicted,
            actual,
            dry_hours_used: rate,
            moisture_known: true,
        }
    }

    fn too_dry(rate: f64) -> GradedFeedback {
        graded(DayScore::Green, ActualFooting::Unsafe, rate)
    }

    fn too_wet(rate: f64) -> GradedFeedback {
        graded(DayScore::Red, ActualFooting::Good, rate)
    }

    fn matched(rate: f64) -> GradedFeedback {
        graded(DayScore::Yellow, ActualFooting::Soft, rate)
    }

    #[test]
    fn test_insufficient_samples() {
        let samples = vec![too_dry(24.0); 4];
        assert_eq!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::InsufficientData { samples: 4 }
        );
    }

    #[test]
    fn test_consistently_too_dry_increases_rate() {
        let samples = vec![too_dry(24.0); 5];
        match decide_adjustment(&samples, 24.0, &TunerConfig::default()) {
            TuneDecision::Adjust { from, to, bias, samples } => {
                assert_eq!(from, 24.0);
                assert!((to - 26.4).abs() < 1e-9);
                assert_eq!(bias, 1.0);
                assert_eq!(samples, 5);
            }
            other => panic!("expected Adjust, got {other:?}"),
        }
    }

    #[test]
    fn test_consistently_too_wet_decreases_rate() {
        let samples = vec![too_wet(24.0); 6];
        match decide_adjustment(&samples, 24.0, &TunerConfig::default()) {
            TuneDecision::Adjust { to, .. } => assert!((to - 21.6).abs() < 1e-9),
            other => panic!("expected Adjust, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_outcomes_leave_rate_alone() {
        let mut samples = vec![too_dry(24.0); 3];
        samples.extend(vec![matched(24.0); 2]);
        samples.push(too_wet(24.0));
        assert!(matches!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::Unbiased { samples: 6, .. }
        ));
    }

    #[test]
    fn test_samples_from_previous_rate_are_ignored() {
        // Evidence that drove the 24 -> 26.4 change must not move 26.4 again
        let samples = vec![too_dry(24.0); 10];
        assert_eq!(
            decide_adjustment(&samples, 26.4, &TunerConfig::default()),
            TuneDecision::InsufficientData { samples: 0 }
        );
    }

    #[test]
    fn test_unbiased_feedback_is_stable() {
        let samples = vec![matched(24.0); 20];
        assert!(matches!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::Unbiased { bias, .. } if bias == 0.0
        ));
    }

    #[test]
    fn test_step_is_bounded_and_clamped() {
        let config = TunerConfig::default();
        let samples = vec![too_dry(95.0); 5];
        match decide_adjustment(&samples, 95.0, &config) {
            TuneDecision::Adjust { to, .. } => assert_eq!(to, MAX_DRY_HOURS_PER_INCH),
            other => panic!("expected Adjust, got {other:?}"),
        }

        let samples = vec![too_dry(MAX_DRY_HOURS_PER_INCH); 5];
        assert!(matches!(
            decide_adjustment(&samples, MAX_DRY_HOURS_PER_INCH, &config),
            TuneDecision::AtLimit { .. }
        ));

        let samples = vec![too_wet(MIN_DRY_HOURS_PER_INCH); 5];
        assert!(matches!(
            decide_adjustment(&samples, MIN_DRY_HOURS_PER_INCH, &config),
            TuneDecision::AtLimit { .. }
        ));
    }

    #[test]
    fn test_repeated_adjustments_stay_in_bounds() {
        let config = TunerConfig::default();
        let mut rate = 24.0;
        for _ in 0..100 {
            let samples = vec![too_wet(rate); 5];
            match decide_adjustment(&samples, rate, &config) {
                TuneDecision::Adjust { from, to, .. } => {
                    assert!(to < from);
                    assert!(from - to <= from * config.step_fraction + 1e-9);
                    rate = to;
                }
                TuneDecision::AtLimit { .. } => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(rate, MIN_DRY_HOURS_PER_INCH);
    }

    #[test]
    fn test_clamp_never_moves_rate_against_bias() {
        let config = TunerConfig::default();

        // Ground wetter than predicted: never lower the rate
        let samples = vec![too_dry(200.0); 10];
        assert_eq!(
            decide_adjustment(&samples, 200.0, &config),
            TuneDecision::AtLimit { rate: 200.0, bias: 1.0 }
        );

        // Ground drier than predicted: never raise the rate
        let samples = vec![too_wet(1.0); 10];
        assert_eq!(
            decide_adjustment(&samples, 1.0, &config),
            TuneDecision::AtLimit { rate: 1.0, bias: -1.0 }
        );
    }

    #[test]
    fn test_predictions_without_moisture_are_ignored() {
        let samples: Vec<GradedFeedback> = (0..10)
            .map(|_| GradedFeedback {
                moisture_known: false,
                ..too_dry(24.0)
            })
            .collect();
        assert_eq!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::InsufficientData { samples: 0 }
        );
    }

    #[test]
    fn test_rates_one_storage_step_apart_are_distinct() {
        let samples = vec![too_dry(24.001); 5];
        assert_eq!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::InsufficientData { samples: 0 }
        );
        let samples = vec![too_dry(24.0004); 5];
        assert!(matches!(
            decide_adjustment(&samples, 24.0, &TunerConfig::default()),
            TuneDecision::Adjust { .. }
        ));
    }

    #[test]
    fn test_invalid_current_rate_is_anomaly() {
        let config = TunerConfig::default();
        for bad in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                decide_adjustment(&[], bad, &config),
                TuneDecision::Anomaly { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_try_request_never_blocks() {
        let (handle, mut rx) = TunerHandle::channel(1);
        assert!(handle.try_request());
        assert!(!handle.try_request(), "second request coalesces into the queued one");
        assert!(rx.recv().await.is_some());

        drop(rx);
        assert!(!handle.try_request());
    }
}
