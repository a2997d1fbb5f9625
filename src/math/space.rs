//! Evenly spaced sample grids.

use crate::error::AppError;

/// `n` evenly spaced values over `[start, stop]` (inclusive).
///
/// Matches the usual numeric convention: `n == 1` yields `[start]`, `n == 0`
/// yields an empty vector.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n as f64 - 1.0);
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            // Pin the endpoint so it does not drift by rounding.
            out[n - 1] = stop;
            out
        }
    }
}

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::input(format!(
            "Invalid log grid range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::input("Log grid steps must be >= 2."));
    }

    let mut out: Vec<f64> = linspace(min.ln(), max.ln(), steps)
        .into_iter()
        .map(f64::exp)
        .collect();
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}
