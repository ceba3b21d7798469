//! Decimal-safe money arithmetic on binary floats
//!
//! Amounts arrive from the store as `f64`. These helpers keep every
//! intermediate result on the decimal grid of the currency's precision, so
//! chains of additions never drift (`0.1 + 0.2` stays `0.3`).
//!
//! # Panics
//!
//! Non-finite inputs (NaN, ±inf) and precisions above [`MAX_PRECISION`] are
//! caller bugs. Every function asserts on them and panics naming the
//! operation. The engine validates store data before calling in here.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Largest currency precision accepted anywhere in the crate
pub const MAX_PRECISION: u32 = 18;

/// Scaled magnitudes at or above 2^52 have no fractional part left to round
const INTEGRAL_THRESHOLD: f64 = 4_503_599_627_370_496.0;

#[inline]
fn assert_finite(op: &str, value: f64) {
    assert!(value.is_finite(), "{op}: non-finite input {value}");
}

#[inline]
fn scale_factor(precision: u32) -> f64 {
    assert!(
        precision <= MAX_PRECISION,
        "precision {precision} exceeds {MAX_PRECISION}"
    );
    10f64.powi(precision as i32)
}

/// Round to `precision` decimal digits, half away from zero.
///
/// The scaled magnitude is nudged up by one machine epsilon (relative) before
/// rounding so that values like `1.005`, stored as `1.00499999…`, land on the
/// decimal they were written as.
///
/// Values already integral at this scale, including those whose scaled
/// magnitude would overflow, are returned unchanged.
///
/// ```rust
/// use balance_core::money::round_to_precision;
///
/// assert_eq!(round_to_precision(1.005, 2), 1.01);
/// assert_eq!(round_to_precision(1.234, 2), 1.23);
/// assert_eq!(round_to_precision(-2.5, 0), -3.0);
/// ```
pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    assert_finite("round_to_precision", value);

    let factor = scale_factor(precision);
    let magnitude = value.abs() * factor;
    if !magnitude.is_finite() || magnitude >= INTEGRAL_THRESHOLD {
        return value;
    }

    let nudged = magnitude * (1.0 + f64::EPSILON);
    let rounded = nudged.round() / factor;

    if rounded == 0.0 {
        0.0
    } else {
        rounded.copysign(value)
    }
}

/// Tolerance below which two amounts are equal: `10^-(precision + 1)`.
pub fn epsilon(precision: u32) -> f64 {
    1.0 / (scale_factor(precision) * 10.0)
}

/// True if `a` and `b` differ by less than [`epsilon`] at `precision`.
///
/// This is a distance test, not "both round to the same value": `1.001` and
/// `1.004` are unequal at precision 2 although both round to `1.00`, while
/// `1.0049` and `1.0051` are equal although they round apart. The distance
/// form keeps `x` equal to `x + epsilon / 2` and unequal to `x + 2 * epsilon`
/// at every precision, which rounding equality cannot.
pub fn amounts_are_equal(a: f64, b: f64, precision: u32) -> bool {
    assert_finite("amounts_are_equal", a);
    assert_finite("amounts_are_equal", b);

    (a - b).abs() < epsilon(precision)
}

/// `a + b`, rounded to `precision` immediately.
///
/// A sum beyond `f64` range comes back as ±inf; callers accumulating
/// untrusted amounts check for it.
pub fn safe_add(a: f64, b: f64, precision: u32) -> f64 {
    assert_finite("safe_add", a);
    assert_finite("safe_add", b);

    round_finite(a + b, precision)
}

/// `a - b`, rounded to `precision` immediately. Overflows like [`safe_add`].
pub fn safe_subtract(a: f64, b: f64, precision: u32) -> f64 {
    assert_finite("safe_subtract", a);
    assert_finite("safe_subtract", b);

    round_finite(a - b, precision)
}

fn round_finite(value: f64, precision: u32) -> f64 {
    if value.is_finite() {
        round_to_precision(value, precision)
    } else {
        value
    }
}

/// Exact decimal with scale `precision`, for display and reports.
///
/// Returns `None` if the value does not fit a `Decimal`.
pub fn to_decimal(value: f64, precision: u32) -> Option<Decimal> {
    let rounded = round_to_precision(value, precision);
    let mut decimal = Decimal::from_f64(rounded)?
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    decimal.rescale(precision);
    Some(decimal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_to_precision(1.005, 2), 1.01);
        assert_eq!(round_to_precision(1.234, 2), 1.23);
        assert_eq!(round_to_precision(1.236, 2), 1.24);
        assert_eq!(round_to_precision(-1.005, 2), -1.01);
        assert_eq!(round_to_precision(2.675, 2), 2.68);
    }

    #[test]
    fn test_round_precision_zero() {
        assert_eq!(round_to_precision(2.5, 0), 3.0);
        assert_eq!(round_to_precision(2.4999, 0), 2.0);
        assert_eq!(round_to_precision(-0.5, 0), -1.0);
        assert_eq!(round_to_precision(1499.5, 0), 1500.0);
    }

    #[test]
    fn test_round_never_returns_negative_zero() {
        let rounded = round_to_precision(-0.001, 2);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());
    }

    #[test]
    fn test_epsilon() {
        assert_eq!(epsilon(2), 0.001);
        assert_eq!(epsilon(1), 0.01);
        assert_eq!(epsilon(0), 0.1);
    }

    #[test]
    fn test_amounts_are_equal() {
        assert!(amounts_are_equal(0.1 + 0.2, 0.3, 2));
        assert!(amounts_are_equal(10.0, 10.0005, 2));
        assert!(!amounts_are_equal(10.0, 10.002, 2));
        assert!(!amounts_are_equal(10.0, 10.01, 2));
    }

    #[test]
    fn test_safe_add_and_subtract() {
        assert_eq!(safe_add(1.234, 1.234, 2), 2.47);
        assert_eq!(safe_subtract(2.468, 1.234, 2), 1.23);
        assert_eq!(safe_add(0.1, 0.2, 2), 0.3);
    }

    #[test]
    fn test_chained_adds_do_not_drift() {
        let mut total = 0.0;
        for _ in 0..1000 {
            total = safe_add(total, 0.1, 2);
        }
        assert_eq!(total, 100.0);
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(1.005, 2).unwrap().to_string(), "1.01");
        assert_eq!(to_decimal(7.0, 2).unwrap().to_string(), "7.00");
        assert_eq!(to_decimal(-3.14159, 3).unwrap().to_string(), "-3.142");
        assert_eq!(to_decimal(42.4, 0).unwrap().to_string(), "42");
    }

    #[test]
    fn test_round_large_values_unchanged() {
        assert_eq!(round_to_precision(1e307, 2), 1e307);
        assert_eq!(round_to_precision(-1e307, 2), -1e307);
        assert_eq!(round_to_precision(f64::MAX, 18), f64::MAX);
        assert_eq!(round_to_precision(1e17, 2), 1e17);
    }

    #[test]
    fn test_safe_add_overflow_is_infinite() {
        assert_eq!(safe_add(f64::MAX, f64::MAX, 2), f64::INFINITY);
        assert_eq!(safe_subtract(-f64::MAX, f64::MAX, 2), f64::NEG_INFINITY);
    }

    #[test]
    fn test_max_precision() {
        assert_eq!(round_to_precision(0.0, MAX_PRECISION), 0.0);
        assert!(epsilon(MAX_PRECISION) > 0.0);
        assert!(amounts_are_equal(1.0, 1.0, MAX_PRECISION));
    }

    #[test]
    #[should_panic(expected = "precision 19 exceeds 18")]
    fn test_precision_above_max_panics() {
        round_to_precision(1.0, 19);
    }

    #[test]
    fn test_equality_is_distance_not_rounding() {
        assert!(!amounts_are_equal(1.001, 1.004, 2));
        assert!(amounts_are_equal(1.0049, 1.0051, 2));
    }

    #[test]
    #[should_panic(expected = "safe_add: non-finite input")]
    fn test_non_finite_input_panics() {
        safe_add(f64::NAN, 1.0, 2);
    }
}
