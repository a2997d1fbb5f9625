//! Relaxation-time grid for the inverse Laplace solver.
//!
//! The distribution is recovered over a fixed log-spaced grid; every solve in a
//! sweep starts from the same bump over the grid *index*.

use crate::error::AppError;
use crate::math::{linspace, log_space};

pub const ILT_T1_MIN_US: f64 = 1e5;
pub const ILT_T1_MAX_US: f64 = 1e7;
pub const ILT_GRID_POINTS: usize = 250;

/// `ILT_GRID_POINTS` log-spaced T1 values over `[ILT_T1_MIN_US, ILT_T1_MAX_US]`.
pub fn t1_grid() -> Result<Vec<f64>, AppError> {
    log_space(ILT_T1_MIN_US, ILT_T1_MAX_US, ILT_GRID_POINTS)
}

/// `exp(−x²/2)` for `x = linspace(−10, 10, n)`.
pub fn gaussian_bump(n: usize) -> Vec<f64> {
    linspace(-10.0, 10.0, n)
        .into_iter()
        .map(|x| (-0.5 * x * x).exp())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_the_fixed_range() {
        let g = t1_grid().unwrap();
        assert_eq!(g.len(), 250);
        assert_eq!(g[0], 1e5);
        assert_eq!(g[249], 1e7);
        // Constant ratio between neighbours.
        let ratio = g[1] / g[0];
        assert!((g[200] / g[199] - ratio).abs() < 1e-9);
    }

    #[test]
    fn bump_peaks_mid_grid() {
        let b = gaussian_bump(251);
        assert_eq!(b[125], 1.0);
        assert!(b[0] < 1e-20);
        assert!((b[10] - b[240]).abs() < 1e-15);
    }
}
