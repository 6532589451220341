// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (period + 1)
//   EMA_0  = close_0
//   EMA_t  = alpha * close_t + (1 - alpha) * EMA_{t-1}
//
// Seeding with the first close (instead of an SMA of the first `period`
// closes) gives a value at every index.  The pipeline always feeds the full
// fetched history, so the seed sits far to the left of the visible range.
// =============================================================================

/// Smoothing factor for a given look-back `period`.
pub fn alpha(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Compute the EMA series for `closes` with look-back `period`.
///
/// The output has the same length as `closes`.
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - empty input => empty vec
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    let Some(&first) = closes.first() else {
        return Vec::new();
    };
    if period == 0 {
        return Vec::new();
    }

    let multiplier = alpha(period);
    let mut result = Vec::with_capacity(closes.len());
    result.push(first);

    let mut prev_ema = first;
    for &close in &closes[1..] {
        let ema = multiplier * close + (1.0 - multiplier) * prev_ema;
        result.push(ema);
        prev_ema = ema;
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_seeded_with_first_close() {
        let ema = calculate_ema(&[42.0, 40.0], 7);
        assert_eq!(ema.len(), 2);
        assert_eq!(ema[0], 42.0);
    }

    #[test]
    fn ema_defined_at_every_index() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        assert_eq!(calculate_ema(&closes, 100).len(), closes.len());
    }

    #[test]
    fn ema_recurrence_holds() {
        let closes = [10.0, 11.0, 9.5, 12.25, 13.0, 12.0, 14.5, 15.0];
        for period in [3, 7, 50] {
            let ema = calculate_ema(&closes, period);
            let a = alpha(period);
            assert_eq!(ema[0], closes[0]);
            for i in 1..closes.len() {
                let expected = a * closes[i] + (1.0 - a) * ema[i - 1];
                assert!(
                    (ema[i] - expected).abs() < 1e-12,
                    "period {period} index {i}: got {}, expected {expected}",
                    ema[i]
                );
            }
        }
    }

    #[test]
    fn ema_known_values() {
        // period 3 => alpha 0.5
        let ema = calculate_ema(&[2.0, 4.0, 8.0], 3);
        assert_eq!(ema, vec![2.0, 3.0, 5.5]);
    }

    #[test]
    fn ema_of_flat_series_is_flat() {
        let ema = calculate_ema(&[100.0; 50], 9);
        assert!(ema.iter().all(|&v| (v - 100.0).abs() < 1e-12));
    }
}
