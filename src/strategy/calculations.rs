//! Centralized statistics shared by the strategies and the risk engine
//!
//! Everything here is a pure function over `f64` slices. Functions return
//! `None` instead of NaN when the input cannot support the statistic.

use chrono::{DateTime, Duration, Utc};

/// Minimum aligned points before a correlation, z-score or tail statistic is trusted
pub const MIN_HISTORY_POINTS: usize = 10;

// =============================================================================
// Moments
// =============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (ddof = 0)
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Pearson correlation of two equal-length series.
///
/// `None` for fewer than two points, mismatched lengths, or a constant series.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    let r = cov / (var_a.sqrt() * var_b.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Correlation of two newest-first series truncated to their common length.
///
/// Requires at least `min_points` after truncation.
pub fn truncated_correlation(a: &[f64], b: &[f64], min_points: usize) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < min_points {
        return None;
    }
    pearson(&a[..n], &b[..n])
}

/// Percentile with linear interpolation between closest ranks, `pct` in [0, 100]
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&pct) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

// =============================================================================
// Time series
// =============================================================================

/// Pair every point of `a` with the closest-in-time point of `b` within `tolerance`.
///
/// Both inputs may be in any order; the output is oldest first.
pub fn align_nearest(
    a: &[(DateTime<Utc>, f64)],
    b: &[(DateTime<Utc>, f64)],
    tolerance: Duration,
) -> Vec<(f64, f64)> {
    let mut a_sorted = a.to_vec();
    a_sorted.sort_by_key(|(ts, _)| *ts);
    let mut b_sorted = b.to_vec();
    b_sorted.sort_by_key(|(ts, _)| *ts);

    if b_sorted.is_empty() {
        return Vec::new();
    }

    let mut aligned = Vec::with_capacity(a_sorted.len());
    let mut j = 0;
    for (ts, value_a) in &a_sorted {
        // Advance while the next b point is at least as close
        while j + 1 < b_sorted.len()
            && (b_sorted[j + 1].0 - *ts).num_milliseconds().abs()
                <= (b_sorted[j].0 - *ts).num_milliseconds().abs()
        {
            j += 1;
        }
        let (ts_b, value_b) = b_sorted[j];
        if (ts_b - *ts).num_milliseconds().abs() <= tolerance.num_milliseconds() {
            aligned.push((*value_a, value_b));
        }
    }
    aligned
}

/// Weighted least-squares slope of `y` against `x`.
///
/// `None` with fewer than two points, zero total weight, or no spread in `x`.
pub fn weighted_slope(x: &[f64], y: &[f64], w: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() != w.len() || x.len() < 2 {
        return None;
    }
    let total: f64 = w.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let mean_x = x.iter().zip(w).map(|(x, w)| x * w).sum::<f64>() / total;
    let mean_y = y.iter().zip(w).map(|(y, w)| y * w).sum::<f64>() / total;

    let mut num = 0.0;
    let mut den = 0.0;
    for ((x, y), w) in x.iter().zip(y).zip(w) {
        num += w * (x - mean_x) * (y - mean_y);
        den += w * (x - mean_x).powi(2);
    }

    if den == 0.0 {
        return None;
    }
    let slope = num / den;
    slope.is_finite().then_some(slope)
}

/// Simple returns `p[i] / p[i+1] - 1` over a newest-first price series
pub fn simple_returns_newest_first(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[1] != 0.0)
        .map(|w| w[0] / w[1] - 1.0)
        .collect()
}
