// src/utils/mod.rs

//! Small numeric helpers shared by the table builders.

pub mod metrics;

/// Round half away from zero to `digits` decimal places.
pub fn round_to(value: f64, digits: u32) -> f64 {
    let scale = 10f64.powi(digits as i32);
    (value * scale).round() / scale
}

/// Fixed-decimal rendering used by every text summary.
pub fn format_rounded(value: f64, digits: u32) -> String {
    format!("{:.*}", digits as usize, round_to(value, digits))
}

/// Empirical quantile of ascending `sorted` with linear interpolation
/// between order statistics. `q` is clamped to `[0, 1]`; `sorted` must not be
/// empty.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
