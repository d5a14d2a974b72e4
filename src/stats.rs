//! Small numeric helpers shared by the detectors.

use chrono::{DateTime, Timelike, Utc};

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. Returns 0.0 for fewer than two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation (stddev / mean). None when the mean is zero or
/// the slice is empty, where the ratio is undefined.
pub(crate) fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = mean(values);
    if m == 0.0 {
        return None;
    }
    Some(std_dev(values) / m)
}

/// Hours between the earliest and latest timestamp. None for fewer than two.
pub(crate) fn span_hours(timestamps: &[DateTime<Utc>]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }
    let min = timestamps.iter().min()?;
    let max = timestamps.iter().max()?;
    Some((*max - *min).num_seconds() as f64 / 3600.0)
}

/// Consecutive gaps in seconds over an ascending timestamp slice.
pub(crate) fn gaps_seconds(sorted: &[DateTime<Utc>]) -> Vec<f64> {
    sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect()
}

/// Hour of day in the operator-declared zone, expressed as a fixed offset
/// from UTC. Timestamps carry no zone of their own.
pub(crate) fn local_hour(timestamp: DateTime<Utc>, offset_hours: i32) -> u32 {
    (timestamp.hour() as i32 + offset_hours).rem_euclid(24) as u32
}

/// True when the amount has non-zero cents.
pub(crate) fn has_cents(amount: f64) -> bool {
    let cents = (amount * 100.0).round() as i64;
    cents % 100 != 0
}

/// True when more than half of the gaps fall within `tolerance` of one of
/// the common recurring periods (1, 7, 14, 30 days).
pub(crate) fn matches_regular_interval(gaps_secs: &[f64], tolerance: f64) -> bool {
    const PERIODS_SECS: [f64; 4] = [86_400.0, 604_800.0, 1_209_600.0, 2_592_000.0];
    if gaps_secs.is_empty() {
        return false;
    }
    PERIODS_SECS.iter().any(|period| {
        let lo = period * (1.0 - tolerance);
        let hi = period * (1.0 + tolerance);
        let hits = gaps_secs.iter().filter(|g| **g >= lo && **g <= hi).count();
        hits * 2 > gaps_secs.len()
    })
}

/// Round to one decimal place for user-visible scores.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
