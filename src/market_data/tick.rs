use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Instrument;

/// Latest instantaneous price state for one instrument.
///
/// Replaced wholesale by every successful ticker refresh; never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    /// The instrument that was selected when this tick was requested.
    pub instrument: Instrument,
    pub value: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub lifetime_high: f64,
    pub lifetime_high_at: DateTime<Utc>,
    pub day_change_pct: f64,
    pub week_change_pct: f64,
    pub month_change_pct: f64,
    pub year_change_pct: f64,
    /// Distance from the lifetime high, in percent (zero or negative in
    /// practice).
    pub from_lifetime_high_pct: f64,
}

/// Percentage distance of `value` from `lifetime_high`.
pub fn change_from_high_pct(value: f64, lifetime_high: f64) -> f64 {
    if lifetime_high == 0.0 {
        return 0.0;
    }
    (value - lifetime_high) / lifetime_high * 100.0
}
