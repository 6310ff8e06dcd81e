//! Null-propagating arithmetic.
//!
//! Every division in the audit goes through [`safe_divide`]: a missing or zero
//! denominator yields `None`, never NaN, infinity or zero.

/// `numerator / denominator`, or `None` when either side is missing, the
/// denominator is zero, or the quotient is not finite.
///
/// # Examples
///
/// ```
/// use audit_core::nullable::safe_divide;
///
/// assert_eq!(safe_divide(Some(15.0), Some(30.0)), Some(0.5));
/// assert_eq!(safe_divide(Some(15.0), Some(0.0)), None);
/// assert_eq!(safe_divide(None, Some(2.0)), None);
/// ```
pub fn safe_divide(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    let quotient = n / d;
    quotient.is_finite().then_some(quotient)
}

/// `lhs - rhs`, or `None` when either side is missing.
pub fn checked_sub(lhs: Option<f64>, rhs: Option<f64>) -> Option<f64> {
    Some(lhs? - rhs?)
}

/// Multiply a nullable value by a constant.
pub fn scale(value: Option<f64>, factor: f64) -> Option<f64> {
    value.map(|v| v * factor)
}

// ── NullableSum ───────────────────────────────────────────────────────────────

/// Running sum that ignores missing values and stays `None` until at least
/// one value has been added.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NullableSum(Option<f64>);

impl NullableSum {
    /// Add `value` to the running total; `None` leaves it untouched.
    pub fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.0 = Some(self.0.unwrap_or(0.0) + v);
        }
    }

    /// The accumulated total, `None` when nothing was ever added.
    pub fn value(&self) -> Option<f64> {
        self.0
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
