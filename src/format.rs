// =============================================================================
// Number Formatting — display strings for prices and percentages
// =============================================================================
//
// Values >= 1 get thousands separators and two decimals.  Values below 1 keep
// four significant fractional digits after the leading zeros, so a token
// trading at 0.00031482 renders as 0.000315 instead of 0.00.
// =============================================================================

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Raised when a value cannot be rendered as a price.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FormatError {
    #[error("cannot format negative value {0}")]
    Negative(f64),
    #[error("cannot format non-finite value {0}")]
    NonFinite(f64),
}

/// Fractional digits kept after the leading zeros of a sub-unit value.
const SIGNIFICANT_FRACTION_DIGITS: usize = 4;

/// Format a non-negative magnitude for display.
///
/// * `value >= 1`: grouped integer part, exactly 2 fractional digits.
/// * `0 <= value < 1`: `leading_zeros + 4` fractional digits.
pub fn number_format(value: f64) -> Result<String, FormatError> {
    if !value.is_finite() {
        return Err(FormatError::NonFinite(value));
    }
    if value < 0.0 {
        return Err(FormatError::Negative(value));
    }

    if value >= 1.0 {
        let fixed = format!("{value:.2}");
        let (int_part, frac_part) = fixed.split_once('.').unwrap_or((&fixed, "00"));
        return Ok(format!("{}.{}", group_thousands(int_part), frac_part));
    }

    let digits = leading_fraction_zeros(value) + SIGNIFICANT_FRACTION_DIGITS;
    Ok(format!("{value:.digits$}"))
}

/// `$`-prefixed [`number_format`].
pub fn format_usd(value: f64) -> Result<String, FormatError> {
    number_format(value).map(|s| format!("${s}"))
}

/// Signed percentage with two decimals, e.g. `-3.27%`.
pub fn format_percent(value: f64) -> Result<String, FormatError> {
    if !value.is_finite() {
        return Err(FormatError::NonFinite(value));
    }
    Ok(format!("{value:.2}%"))
}

/// Calendar date label such as `14 Mar 2024`.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%d %b %Y").to_string()
}

/// Count the zeros directly after the decimal point of the shortest decimal
/// representation.  Zero itself reads as `0.0` and counts one.
fn leading_fraction_zeros(value: f64) -> usize {
    let repr = value.to_string();
    let fraction = match repr.split_once('.') {
        Some((_, frac)) if !frac.is_empty() => frac,
        _ => "0",
    };
    fraction.chars().take_while(|&c| c == '0').count()
}

fn group_thousands(int_part: &str) -> String {
    let len = int_part.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fraction_len(s: &str) -> usize {
        s.split_once('.').map(|(_, f)| f.len()).unwrap_or(0)
    }

    #[test]
    fn large_values_are_grouped() {
        assert_eq!(number_format(43123.4).unwrap(), "43,123.40");
        assert_eq!(number_format(1_234_567.891).unwrap(), "1,234,567.89");
        assert_eq!(number_format(1.0).unwrap(), "1.00");
        assert_eq!(number_format(999.0).unwrap(), "999.00");
    }

    #[test]
    fn rounding_can_carry_into_a_new_group() {
        assert_eq!(number_format(999.999).unwrap(), "1,000.00");
    }

    #[test]
    fn small_values_keep_significant_digits() {
        assert_eq!(number_format(0.00031482).unwrap(), "0.000315");
        assert_eq!(number_format(0.5).unwrap(), "0.5000");
        assert_eq!(number_format(0.0123456).unwrap(), "0.01235");
    }

    #[test]
    fn tiny_values_do_not_round_to_zero() {
        let s = number_format(0.0000012346).unwrap();
        assert_eq!(s, "0.000001235");
        assert_eq!(fraction_len(&s), 5 + 4);
    }

    #[test]
    fn zero_uses_one_leading_zero() {
        assert_eq!(number_format(0.0).unwrap(), "0.00000");
    }

    #[test]
    fn fraction_width_property() {
        for v in [1.0, 7.5, 88.123, 10_000.0, 65_432.109] {
            assert_eq!(fraction_len(&number_format(v).unwrap()), 2, "value {v}");
        }
        for (v, zeros) in [(0.2, 0), (0.05, 1), (0.0042, 2), (0.000_77, 3)] {
            assert_eq!(
                fraction_len(&number_format(v).unwrap()),
                zeros + 4,
                "value {v}"
            );
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(number_format(-1.0), Err(FormatError::Negative(-1.0)));
        assert!(matches!(number_format(f64::NAN), Err(FormatError::NonFinite(_))));
        assert!(matches!(
            number_format(f64::INFINITY),
            Err(FormatError::NonFinite(_))
        ));
    }

    #[test]
    fn usd_and_percent_helpers() {
        assert_eq!(format_usd(64_000.0).unwrap(), "$64,000.00");
        assert_eq!(format_percent(-3.274).unwrap(), "-3.27%");
        assert_eq!(format_percent(12.0).unwrap(), "12.00%");
        assert!(format_percent(f64::NAN).is_err());
    }

    #[test]
    fn date_label() {
        let ts = Utc.timestamp_opt(1_710_417_600, 0).unwrap();
        assert_eq!(format_date(ts), "14 Mar 2024");
    }
}
