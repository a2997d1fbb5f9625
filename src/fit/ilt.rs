//! Regularized inverse Laplace transform over a fixed T1 grid.
//!
//! For each regularization strength `α` we solve
//!
//! ```text
//! minimize ‖y − K·P‖² + α·‖P‖²   subject to  1e-9 ≤ P_j ≤ 1,  Σ P_j = 1
//! ```
//!
//! with `K[i,j] = Σ_k (1 − 2·p_k·exp(−q_k·t_i/T_j))`. The problem is strongly
//! convex (modulus `2α`), so accelerated projected gradient with the constant
//! momentum `(√L − √μ)/(√L + √μ)` converges linearly. The solved vector is then
//! divided by its own sum.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{IltCurve, IltSkip, IltSweep};
use crate::error::AppError;
use crate::fit::t1_grid::{gaussian_bump, t1_grid};
use crate::math::project_capped_simplex;
use crate::models::kernel_entry;

/// Regularization strengths swept on every fit.
pub const ILT_ALPHAS: [f64; 5] = [1.0, 10.0, 100.0, 1000.0, 10000.0];

/// Solver settings for one regularized solve.
#[derive(Debug, Clone)]
pub struct IltOptions {
    pub lower: f64,
    pub upper: f64,
    /// Stop once no entry moves by more than this in one step.
    pub step_tol: f64,
    pub max_iterations: usize,
}

impl Default for IltOptions {
    fn default() -> Self {
        Self {
            lower: 1e-9,
            upper: 1.0,
            step_tol: 1e-10,
            max_iterations: 200_000,
        }
    }
}

/// `N × M` kernel over `delays` (rows) and `grid` (columns).
pub fn kernel_matrix(delays: &[f64], grid: &[f64]) -> DMatrix<f64> {
    DMatrix::from_fn(delays.len(), grid.len(), |i, j| kernel_entry(delays[i], grid[j]))
}

/// Solve for one `α`, starting from `initial` (projected first).
pub fn solve_regularized(
    kernel: &DMatrix<f64>,
    y: &DVector<f64>,
    alpha: f64,
    sigma_max: f64,
    initial: &[f64],
    opts: &IltOptions,
) -> Result<(Vec<f64>, usize), AppError> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(AppError::input(format!("Regularization strength must be > 0 (got {alpha}).")));
    }
    if initial.len() != kernel.ncols() || y.len() != kernel.nrows() {
        return Err(AppError::input("ILT dimensions do not match the kernel."));
    }

    let lipschitz = 2.0 * (sigma_max * sigma_max + alpha);
    let mu = 2.0 * alpha;
    let momentum = (lipschitz.sqrt() - mu.sqrt()) / (lipschitz.sqrt() + mu.sqrt());
    let project = |v: &[f64]| project_capped_simplex(v, opts.lower, opts.upper, 1.0);

    let mut x = DVector::from_vec(project(initial)?);
    let mut z = x.clone();

    for iteration in 1..=opts.max_iterations {
        let residual = kernel * &z - y;
        let gradient = (kernel.tr_mul(&residual) + &z * alpha) * 2.0;
        let step = &z - gradient / lipschitz;
        let next = DVector::from_vec(project(step.as_slice())?);

        let moved = (&next - &x).amax();
        if !moved.is_finite() {
            return Err(AppError::numeric(format!("ILT diverged at α = {alpha}.")));
        }
        z = &next + (&next - &x) * momentum;
        x = next;

        if moved <= opts.step_tol {
            return Ok((x.as_slice().to_vec(), iteration));
        }
    }
    Err(AppError::numeric(format!(
        "ILT did not converge within {} iterations at α = {alpha}.",
        opts.max_iterations
    )))
}

/// `‖y − K·P‖² + α·‖P‖²`.
pub fn ilt_objective(kernel: &DMatrix<f64>, y: &DVector<f64>, p: &DVector<f64>, alpha: f64) -> f64 {
    (kernel * p - y).norm_squared() + alpha * p.norm_squared()
}

/// Run the full `α` sweep; a failed `α` is recorded and skipped.
pub fn inverse_laplace_sweep(
    delays: &[f64],
    intensities: &[f64],
    opts: &IltOptions,
) -> Result<IltSweep, AppError> {
    if delays.is_empty() {
        return Err(AppError::no_data("No delay/intensity pairs for the ILT."));
    }
    if delays.len() != intensities.len() {
        return Err(AppError::input(format!(
            "Delay times ({}) and intensities ({}) differ in length.",
            delays.len(),
            intensities.len()
        )));
    }
    if delays.iter().chain(intensities).any(|v| !v.is_finite()) {
        return Err(AppError::input("Delay times and intensities must be finite."));
    }

    let grid = t1_grid()?;
    let kernel = kernel_matrix(delays, &grid);
    let y = DVector::from_column_slice(intensities);
    let sigma_max = kernel.singular_values().max();
    let initial = gaussian_bump(grid.len());

    let results: Vec<Result<IltCurve, AppError>> = ILT_ALPHAS
        .par_iter()
        .map(|&alpha| {
            let (solved, iterations) = solve_regularized(&kernel, &y, alpha, sigma_max, &initial, opts)?;
            let total: f64 = solved.iter().sum();
            if !(total.is_finite() && total > 0.0) {
                return Err(AppError::numeric(format!("ILT solution at α = {alpha} has sum {total}.")));
            }
            let distribution: Vec<f64> = solved.iter().map(|p| p / total).collect();
            let objective = ilt_objective(&kernel, &y, &DVector::from_column_slice(&distribution), alpha);
            log::debug!("ILT α = {alpha}: {iterations} iterations, objective {objective:.6e}.");
            Ok(IltCurve {
                alpha,
                t1_grid: grid.clone(),
                distribution,
                objective,
                iterations,
            })
        })
        .collect();

    let mut sweep = IltSweep::default();
    for (alpha, result) in ILT_ALPHAS.iter().zip(results) {
        match result {
            Ok(curve) => sweep.curves.push(curve),
            Err(e) => {
                log::warn!("Skipping ILT curve for α = {alpha}: {e}");
                sweep.skipped.push(IltSkip {
                    alpha: *alpha,
                    reason: e.message().to_string(),
                });
            }
        }
    }
    Ok(sweep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VENDOR_DELAY_TABLE_US;

    /// Intensities that some distribution on the grid reproduces exactly.
    fn consistent_data(target_index: usize) -> (Vec<f64>, Vec<f64>) {
        let grid = t1_grid().unwrap();
        let t = VENDOR_DELAY_TABLE_US.to_vec();
        let y = t.iter().map(|&t| kernel_entry(t, grid[target_index])).collect();
        (t, y)
    }

    #[test]
    fn kernel_has_expected_shape_and_range() {
        let grid = t1_grid().unwrap();
        let k = kernel_matrix(&VENDOR_DELAY_TABLE_US, &grid);
        assert_eq!(k.shape(), (22, 250));
        assert!(k.iter().all(|&v| (2.0..=4.0).contains(&v)));
    }

    #[test]
    fn every_curve_is_a_bounded_distribution() {
        let (t, y) = consistent_data(125);
        let sweep = inverse_laplace_sweep(&t, &y, &IltOptions::default()).unwrap();
        assert_eq!(sweep.curves.len(), ILT_ALPHAS.len());
        assert!(sweep.skipped.is_empty());
        for curve in &sweep.curves {
            let total: f64 = curve.distribution.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "α = {}: sum {total}", curve.alpha);
            for &p in &curve.distribution {
                assert!(p >= 1e-9 * (1.0 - 1e-9) && p <= 1.0 + 1e-12, "α = {}: entry {p}", curve.alpha);
            }
        }
    }

    #[test]
    fn larger_alpha_never_sharpens_the_distribution() {
        let (t, y) = consistent_data(80);
        let sweep = inverse_laplace_sweep(&t, &y, &IltOptions::default()).unwrap();
        let norms: Vec<f64> = sweep
            .curves
            .iter()
            .map(|c| c.distribution.iter().map(|p| p * p).sum::<f64>().sqrt())
            .collect();
        for w in norms.windows(2) {
            assert!(w[1] <= w[0] + 1e-6, "norms {norms:?}");
        }
    }

    #[test]
    fn weak_regularization_peaks_near_the_true_t1() {
        let (t, y) = consistent_data(150);
        let sweep = inverse_laplace_sweep(&t, &y, &IltOptions::default()).unwrap();
        let peak = sweep.curves[0].peak_index().unwrap();
        assert!(peak.abs_diff(150) <= 25, "peak at {peak}");
    }

    #[test]
    fn failed_alpha_is_skipped_not_fatal() {
        let (t, y) = consistent_data(125);
        let opts = IltOptions {
            max_iterations: 1,
            ..IltOptions::default()
        };
        let sweep = inverse_laplace_sweep(&t, &y, &opts).unwrap();
        assert!(sweep.curves.is_empty());
        assert_eq!(sweep.skipped.len(), ILT_ALPHAS.len());
        assert_eq!(sweep.skipped[0].alpha, 1.0);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(inverse_laplace_sweep(&[1.0], &[1.0, 2.0], &IltOptions::default()).is_err());
        assert!(inverse_laplace_sweep(&[], &[], &IltOptions::default()).is_err());
    }
}
