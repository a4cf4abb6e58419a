//! Shared helpers for Decimal ↔ f64 conversions, unit conversion and
//! local-time arithmetic.
//!
//! Settings and snapshots are stored as NUMERIC columns, so every value
//! crossing the DB boundary goes through one of these conversions:
//!
//! - `f64_to_decimal(v, 1)`: temperatures, wind speeds, percentages
//! - `f64_to_decimal(v, 3)`: rainfall and moisture depths in inches
//! - `f64_to_decimal(v, 6)`: geographic coordinates
//!
//! Non-finite inputs (NaN, ±Inf) convert to `Decimal::ZERO`.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

const MM_PER_INCH: f64 = 25.4;

/// Convert an f64 to Decimal rounded to `dp` decimal places.
pub(crate) fn f64_to_decimal(v: f64, dp: u32) -> Decimal {
    if !v.is_finite() {
        tracing::warn!("f64_to_decimal received non-finite value {}, defaulting to 0", v);
        return Decimal::ZERO;
    }
    Decimal::from_f64(v)
        .map(|d| d.round_dp(dp))
        .unwrap_or(Decimal::ZERO)
}

/// Convert an optional f64 to Decimal, returning None if input is None.
pub(crate) fn opt_f64_to_decimal(v: Option<f64>, dp: u32) -> Option<Decimal> {
    v.map(|x| f64_to_decimal(x, dp))
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Convert an Option<Decimal> to Option<f64>.
pub(crate) fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

/// Millimetres of precipitation to inches.
pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

/// Shift a UTC instant into the site's local wall-clock time.
///
/// `tz_offset_secs` is the forecast provider's offset from UTC (negative
/// west of Greenwich), so no timezone database is needed.
pub fn to_local(dt: DateTime<Utc>, tz_offset_secs: i32) -> NaiveDateTime {
    dt.naive_utc() + Duration::seconds(i64::from(tz_offset_secs))
}
