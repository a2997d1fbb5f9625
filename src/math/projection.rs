//! Euclidean projection onto the capped simplex
//! `{x : lo ≤ x_i ≤ hi, Σ x_i = total}`.
//!
//! The projection is `x_i = clamp(v_i − τ, lo, hi)` for the unique shift `τ`
//! where the clamped sum hits `total`. The clamped sum is piecewise linear and
//! non-increasing in `τ` with breakpoints at `v_i − hi` and `v_i − lo`, so we
//! binary-search the sorted breakpoints and interpolate inside the bracketing
//! segment. The result is exact up to rounding.

use crate::error::AppError;

/// Project `v` onto the capped simplex.
pub fn project_capped_simplex(v: &[f64], lo: f64, hi: f64, total: f64) -> Result<Vec<f64>, AppError> {
    let n = v.len();
    if n == 0 {
        return Err(AppError::input("Cannot project an empty vector."));
    }
    if !(lo.is_finite() && hi.is_finite() && total.is_finite()) || lo > hi {
        return Err(AppError::input(format!(
            "Invalid projection bounds: lo={lo}, hi={hi}, total={total}."
        )));
    }
    if lo * (n as f64) > total || hi * (n as f64) < total {
        return Err(AppError::numeric(format!(
            "Capped simplex is empty: {n} entries in [{lo}, {hi}] cannot sum to {total}."
        )));
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(AppError::numeric("Cannot project a non-finite vector."));
    }

    let clamped_sum = |tau: f64| -> f64 { v.iter().map(|&x| (x - tau).clamp(lo, hi)).sum() };

    let mut breaks: Vec<f64> = Vec::with_capacity(2 * n);
    for &x in v {
        breaks.push(x - hi);
        breaks.push(x - lo);
    }
    breaks.sort_by(|a, b| a.total_cmp(b));

    // At the first breakpoint everything sits at `hi`, at the last at `lo`.
    let mut left = 0usize;
    let mut right = breaks.len() - 1;
    while right - left > 1 {
        let mid = (left + right) / 2;
        if clamped_sum(breaks[mid]) >= total {
            left = mid;
        } else {
            right = mid;
        }
    }

    let (t0, t1) = (breaks[left], breaks[right]);
    let (s0, s1) = (clamped_sum(t0), clamped_sum(t1));
    let tau = if (s0 - s1).abs() <= f64::EPSILON * total.abs().max(1.0) {
        t0
    } else {
        t0 + (s0 - total) * (t1 - t0) / (s0 - s1)
    };

    Ok(v.iter().map(|&x| (x - tau).clamp(lo, hi)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(v: &[f64]) -> f64 {
        v.iter().sum()
    }

    #[test]
    fn feasible_point_is_left_alone() {
        let v = [0.2, 0.3, 0.5];
        let p = project_capped_simplex(&v, 0.0, 1.0, 1.0).unwrap();
        for (a, b) in p.iter().zip(v.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn projection_respects_bounds_and_total() {
        let v = [5.0, -2.0, 0.1, 0.4, 3.0];
        let p = project_capped_simplex(&v, 1e-9, 1.0, 1.0).unwrap();
        assert!((sum(&p) - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|&x| (1e-9..=1.0).contains(&x)));
        // Largest input keeps the largest share.
        let argmax = p
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(argmax, Some(0));
    }

    #[test]
    fn uniform_shift_for_equal_inputs() {
        let v = [7.0; 4];
        let p = project_capped_simplex(&v, 0.0, 1.0, 1.0).unwrap();
        assert!(p.iter().all(|&x| (x - 0.25).abs() < 1e-12));
    }

    #[test]
    fn infeasible_caps_are_rejected() {
        assert!(project_capped_simplex(&[0.0, 0.0], 0.0, 0.4, 1.0).is_err());
        assert!(project_capped_simplex(&[0.0, 0.0], 0.6, 1.0, 1.0).is_err());
    }
}
