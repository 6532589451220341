// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
//   SMA_i = (close_{i-w+1} + ... + close_i) / w      for i >= w - 1
//
// Indices before the first full window have no value.
// =============================================================================

/// Compute the SMA series for `closes` with window `period`.
///
/// The output has the same length as `closes`; entry `i` is `None` while
/// fewer than `period` closes are available.  `period == 0` yields all `None`.
pub fn calculate_sma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return result;
    }

    for (offset, window) in closes.windows(period).enumerate() {
        let mean = window.iter().sum::<f64>() / period as f64;
        result[offset + period - 1] = Some(mean);
    }

    result
}
