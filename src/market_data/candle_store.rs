use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::TickSnapshot;
use crate::indicators::{IndicatorEngine, IndicatorSeries};
use crate::types::{Instrument, Interval};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV bar.  `timestamp` is the period start in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Period start as a UTC date-time.
    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn is_up(&self) -> bool {
        self.close > self.open
    }
}

/// Composite key that identifies a candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub instrument: Instrument,
    pub interval: Interval,
}

impl CandleKey {
    pub fn new(instrument: Instrument, interval: Interval) -> Self {
        Self {
            instrument,
            interval,
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.instrument, self.interval)
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Fold a live price into the still-forming last candle.
///
/// The last candle's close becomes `price`; its high and low widen to include
/// `price`.  All earlier candles are copied untouched.
pub fn reconcile_last(candles: &[Candle], price: f64) -> Vec<Candle> {
    let mut out = candles.to_vec();
    if let Some(last) = out.last_mut() {
        last.close = price;
        if price > last.high {
            last.high = price;
        }
        if price < last.low {
            last.low = price;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// ChartSnapshot
// ---------------------------------------------------------------------------

/// A candle sequence together with the overlays computed from it.
///
/// The pair is only ever built and replaced as a unit, so a reader can never
/// observe candles of one series next to indicators of another.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub key: CandleKey,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSeries,
    /// Live price last folded into the final candle, if any.
    pub reconciled_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ChartSnapshot {
    fn build(
        key: CandleKey,
        candles: Vec<Candle>,
        engine: &IndicatorEngine,
        reconciled_price: Option<f64>,
    ) -> Self {
        let indicators = engine.compute(&candles);
        Self {
            key,
            candles,
            indicators,
            reconciled_price,
            updated_at: Utc::now(),
        }
    }

    /// Same key and bar-for-bar identical candles.  Indicators are derived, so
    /// they match whenever the candles do.
    pub fn same_series(&self, other: &ChartSnapshot) -> bool {
        self.key == other.key && self.candles == other.candles
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

// ---------------------------------------------------------------------------
// CandleStore
// ---------------------------------------------------------------------------

/// What a store operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    /// A new series was installed.
    Replaced,
    /// The held series had its last candle patched by a tick.
    Reconciled,
    /// The result was identical to what was already held.
    Unchanged,
    /// Nothing applicable: a tick for another series, or an empty fetch.
    Skipped,
}

/// Holds the chart series for the active instrument/interval pair.
///
/// Full refreshes replace the series wholesale; ticks in between patch the
/// most recent candle.  Both paths recompute the indicators over the complete
/// history and swap the `(candles, indicators)` pair under a single write lock.
pub struct CandleStore {
    current: RwLock<Option<Arc<ChartSnapshot>>>,
    engine: IndicatorEngine,
}

impl CandleStore {
    pub fn new(engine: IndicatorEngine) -> Self {
        Self {
            current: RwLock::new(None),
            engine,
        }
    }

    /// The currently held series, if any.
    pub fn current(&self) -> Option<Arc<ChartSnapshot>> {
        self.current.read().clone()
    }

    /// Install a freshly fetched series.
    ///
    /// When the store already holds the same key, `latest_tick` (if it is for
    /// the same instrument) is folded into the new last candle so a routine
    /// chart refresh does not roll the live candle back.  A series for a
    /// different key is installed as fetched; reconciliation resumes with the
    /// next tick.  An empty `candles` never replaces the held series.
    pub fn replace(
        &self,
        key: CandleKey,
        candles: Vec<Candle>,
        latest_tick: Option<&TickSnapshot>,
    ) -> StoreUpdate {
        if candles.is_empty() {
            debug!(key = %key, "empty candle series ignored");
            return StoreUpdate::Skipped;
        }

        let mut slot = self.current.write();

        let same_key = slot.as_ref().is_some_and(|held| held.key == key);
        let tick_price = latest_tick
            .filter(|tick| same_key && tick.instrument == key.instrument)
            .map(|tick| tick.value);

        let candles = match tick_price {
            Some(price) => reconcile_last(&candles, price),
            None => candles,
        };

        let next = ChartSnapshot::build(key, candles, &self.engine, tick_price);
        if slot.as_ref().is_some_and(|held| held.same_series(&next)) {
            return StoreUpdate::Unchanged;
        }

        debug!(
            key = %next.key,
            candles = next.candles.len(),
            reconciled = tick_price.is_some(),
            "chart series replaced"
        );
        *slot = Some(Arc::new(next));
        StoreUpdate::Replaced
    }

    /// Fold a tick into the held series if it belongs to it.
    pub fn reconcile(&self, tick: &TickSnapshot) -> StoreUpdate {
        let mut slot = self.current.write();

        let Some(held) = slot.as_ref() else {
            return StoreUpdate::Skipped;
        };
        if held.key.instrument != tick.instrument || held.candles.is_empty() {
            return StoreUpdate::Skipped;
        }

        let candles = reconcile_last(&held.candles, tick.value);
        if candles == held.candles {
            return StoreUpdate::Unchanged;
        }

        let next = ChartSnapshot::build(held.key.clone(), candles, &self.engine, Some(tick.value));
        debug!(key = %next.key, price = tick.value, "tick reconciled into last candle");
        *slot = Some(Arc::new(next));
        StoreUpdate::Reconciled
    }

    /// Drop the held series (e.g. after the selection moved elsewhere).
    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
