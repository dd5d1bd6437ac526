use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::ToPrimitive;

/// Rounds half away from zero to two decimals.
///
/// Rounds the shortest decimal form of `value`, so `1.005` becomes `1.01`
/// even though its binary value sits just below the midpoint.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let Ok(decimal) = BigDecimal::from_str(&value.to_string()) else {
        return value;
    };
    decimal
        .with_scale_round(2, RoundingMode::HalfUp)
        .to_f64()
        .unwrap_or(value)
}

/// Percent change from `previous` to `current`, rounded to two decimals.
///
/// `None` when the previous value is missing, zero or the result is not
/// finite; such rows are dropped rather than reported as infinity.
pub fn pct_change(previous: Option<f64>, current: Option<f64>) -> Option<f64> {
    let previous = previous?;
    let current = current?;
    if previous == 0.0 {
        return None;
    }
    let change = (current - previous) / previous * 100.0;
    change.is_finite().then(|| round2(change))
}

/// `numerator / denominator * 100`, rounded; `None` on a zero denominator.
pub fn pct_of(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    let pct = numerator / denominator * 100.0;
    pct.is_finite().then(|| round2(pct))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let avg = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Sum of the present values; `None` if none are present.
pub fn sum_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}
