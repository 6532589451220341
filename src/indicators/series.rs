// =============================================================================
// Indicator Engine — full-history moving-average overlays
// =============================================================================
//
// Overlays are always recomputed over the whole fetched candle history and only
// then cut down to the displayed range, so the left edge of the visible window
// never shows partial-window artifacts.
// =============================================================================

use serde::Serialize;

use super::ema::calculate_ema;
use super::sma::calculate_sma;
use crate::market_data::Candle;

/// One SMA overlay.  `values[i]` is `None` during the warm-up window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmaLine {
    pub window: usize,
    pub values: Vec<Option<f64>>,
}

/// One EMA overlay, defined at every index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmaLine {
    pub window: usize,
    pub values: Vec<f64>,
}

/// Overlays aligned index-for-index with the candle sequence they were
/// computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSeries {
    pub sma: Vec<SmaLine>,
    pub ema: Vec<EmaLine>,
}

impl IndicatorSeries {
    /// Keep only the last `count` entries of every overlay.
    pub fn tail(&self, count: usize) -> Self {
        Self {
            sma: self
                .sma
                .iter()
                .map(|line| SmaLine {
                    window: line.window,
                    values: tail_slice(&line.values, count).to_vec(),
                })
                .collect(),
            ema: self
                .ema
                .iter()
                .map(|line| EmaLine {
                    window: line.window,
                    values: tail_slice(&line.values, count).to_vec(),
                })
                .collect(),
        }
    }

    /// Last SMA value for `window`, if the overlay exists and is warmed up.
    pub fn last_sma(&self, window: usize) -> Option<f64> {
        self.sma
            .iter()
            .find(|line| line.window == window)
            .and_then(|line| line.values.last().copied().flatten())
    }

    /// Last EMA value for `window`.
    pub fn last_ema(&self, window: usize) -> Option<f64> {
        self.ema
            .iter()
            .find(|line| line.window == window)
            .and_then(|line| line.values.last().copied())
    }
}

/// Computes the configured SMA and EMA windows over a candle sequence.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    windows: Vec<usize>,
}

impl IndicatorEngine {
    /// Zero-width windows are dropped; duplicates are collapsed.
    pub fn new(windows: &[usize]) -> Self {
        let mut windows: Vec<usize> = windows.iter().copied().filter(|&w| w > 0).collect();
        windows.sort_unstable();
        windows.dedup();
        Self { windows }
    }

    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    pub fn compute(&self, candles: &[Candle]) -> IndicatorSeries {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        IndicatorSeries {
            sma: self
                .windows
                .iter()
                .map(|&window| SmaLine {
                    window,
                    values: calculate_sma(&closes, window),
                })
                .collect(),
            ema: self
                .windows
                .iter()
                .map(|&window| EmaLine {
                    window,
                    values: calculate_ema(&closes, window),
                })
                .collect(),
        }
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(&[7, 50, 100])
    }
}

pub(crate) fn tail_slice<T>(values: &[T], count: usize) -> &[T] {
    &values[values.len().saturating_sub(count)..]
}
