// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free moving averages over a close series.  Every output is
// aligned index-for-index with its input so the chart layer can truncate
// candles and overlays with the same slice bounds.

pub mod ema;
pub mod series;
pub mod sma;

pub use series::{IndicatorEngine, IndicatorSeries};
