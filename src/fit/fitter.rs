//! Nonlinear fit of the spin-7/2 recovery law.
//!
//! Given:
//! - delay times `t_i` (μs)
//! - integrated intensities `y_i`
//!
//! we minimize `Σ (y_i − fit(t_i))²` over `(y0, s, T1, r)` inside a data-derived
//! bound box using differential evolution, then report the parameters and the
//! fitted curve at the input delays.

use crate::domain::{CurveSamples, RelaxationFit, RelaxationModel, RelaxationParams};
use crate::error::AppError;
use crate::math::{DeOptions, differential_evolution};
use crate::models::{predict, predict_raw};

/// Smallest admissible lower bound on `T1` (μs).
const MIN_T1_BOUND: f64 = 1e-12;

/// Absolute convergence tolerance, relative to the data's energy `Σ y²`.
const ATOL_FRACTION: f64 = 1e-9;

/// Fitting options for one invocation.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub model: RelaxationModel,
    /// Divide the working intensities by their maximum first.
    pub normalize: bool,
    pub seed: u64,
    pub max_generations: usize,
    /// Previous fit's parameters, used to seed the population.
    pub warm_start: Option<[f64; 4]>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            model: RelaxationModel::Spin72,
            normalize: false,
            seed: 42,
            max_generations: 1000,
            warm_start: None,
        }
    }
}

/// Bound box `[(lo, hi); 4]` for `(y0, s, T1, r)`.
///
/// `y0 ∈ [0, 10·max y]`, `s ∈ [−1, 10]`, `T1 ∈ [min t / 10, 10·max t]`,
/// `r ∈ [0.99, 1.01]`.
pub fn parameter_bounds(delays: &[f64], intensities: &[f64]) -> Result<[(f64, f64); 4], AppError> {
    let y_max = intensities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(y_max.is_finite() && y_max > 0.0) {
        return Err(AppError::numeric(format!(
            "Cannot bound the amplitude: maximum intensity is {y_max} (must be > 0)."
        )));
    }
    let t_min = delays.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = delays.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(t_max.is_finite() && t_max > 0.0) {
        return Err(AppError::input(format!(
            "Delay times must include a positive value (max = {t_max})."
        )));
    }
    let t1_lo = (t_min / 10.0).max(MIN_T1_BOUND);
    let t1_hi = 10.0 * t_max;

    Ok([(0.0, 10.0 * y_max), (-1.0, 10.0), (t1_lo, t1_hi), (0.99, 1.01)])
}

/// Fit the recovery law to `(delays, intensities)`.
///
/// Non-convergence within `max_generations` is an error rather than a silently
/// returned best guess.
pub fn fit_relaxation(
    delays: &[f64],
    intensities: &[f64],
    opts: &FitOptions,
) -> Result<RelaxationFit, AppError> {
    if delays.is_empty() {
        return Err(AppError::no_data("No delay/intensity pairs to fit."));
    }
    if delays.len() != intensities.len() {
        return Err(AppError::input(format!(
            "Delay times ({}) and intensities ({}) differ in length.",
            delays.len(),
            intensities.len()
        )));
    }
    let needed = opts.model.param_count();
    if delays.len() < needed {
        return Err(AppError::numeric(format!(
            "Need at least {needed} delay/intensity pairs to fit {} (got {}).",
            opts.model.display_name(),
            delays.len()
        )));
    }
    if delays.iter().chain(intensities).any(|v| !v.is_finite()) {
        return Err(AppError::input("Delay times and intensities must be finite."));
    }

    let observed = working_intensities(intensities, opts.normalize)?;
    let bounds = parameter_bounds(delays, &observed)?;
    let model = opts.model;

    let sse_of = |params: &[f64]| -> f64 {
        delays
            .iter()
            .zip(observed.iter())
            .map(|(&t, &y)| {
                let r = y - predict_raw(model, t, params);
                r * r
            })
            .sum()
    };

    let energy: f64 = observed.iter().map(|y| y * y).sum();
    let de = DeOptions {
        seed: opts.seed,
        max_generations: opts.max_generations,
        atol: ATOL_FRACTION * energy,
        ..DeOptions::default()
    };
    let outcome = differential_evolution(sse_of, &bounds, opts.warm_start.as_ref().map(|w| &w[..]), &de)?;
    if !outcome.converged {
        return Err(AppError::numeric(format!(
            "Relaxation fit did not converge within {} generations (best SSE {:.6e}).",
            opts.max_generations, outcome.energy
        )));
    }

    let params = RelaxationParams::from_slice(&outcome.x)
        .ok_or_else(|| AppError::numeric("Optimizer returned the wrong number of parameters."))?;
    let fitted: Vec<f64> = delays.iter().map(|&t| predict(model, t, &params)).collect();
    let sse = outcome.energy;
    let rmse = (sse / delays.len() as f64).sqrt();

    log::info!(
        "Fitted {}: y0={:.6e} s={:.4} T1={:.6e} r={:.4} (SSE {:.3e}, {} generations).",
        model.display_name(),
        params.y0,
        params.s,
        params.t1,
        params.r,
        sse,
        outcome.generations
    );

    Ok(RelaxationFit {
        model,
        params,
        curve: CurveSamples {
            t: delays.to_vec(),
            y: fitted,
        },
        observed,
        normalized: opts.normalize,
        sse,
        rmse,
        generations: outcome.generations,
    })
}

fn working_intensities(intensities: &[f64], normalize: bool) -> Result<Vec<f64>, AppError> {
    if !normalize {
        return Ok(intensities.to_vec());
    }
    let max = intensities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max.is_finite() && max > 0.0) {
        return Err(AppError::numeric(format!(
            "Cannot normalize intensities with maximum {max}."
        )));
    }
    Ok(intensities.iter().map(|y| y / max).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VENDOR_DELAY_TABLE_US;

    fn synthetic(params: &RelaxationParams) -> (Vec<f64>, Vec<f64>) {
        let t = VENDOR_DELAY_TABLE_US.to_vec();
        let y = t.iter().map(|&t| predict(RelaxationModel::Spin72, t, params)).collect();
        (t, y)
    }

    fn rel(a: f64, b: f64) -> f64 {
        (a - b).abs() / b.abs().max(1e-12)
    }

    #[test]
    fn recovers_saturation_recovery_parameters() {
        let truth = RelaxationParams {
            y0: 100.0,
            s: 0.0,
            t1: 2.0e6,
            r: 1.0,
        };
        let (t, y) = synthetic(&truth);
        let fit = fit_relaxation(&t, &y, &FitOptions::default()).unwrap();

        assert!(rel(fit.params.y0, 100.0) < 0.01, "y0 = {}", fit.params.y0);
        assert!(rel(fit.params.t1, 2.0e6) < 0.01, "T1 = {}", fit.params.t1);
        assert!(fit.params.s.abs() < 0.01, "s = {}", fit.params.s);
        assert!((fit.params.r - 1.0).abs() < 0.01);
        for (a, b) in fit.curve.y.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-3 * 100.0, "curve {a} vs {b}");
        }
        assert_eq!(fit.curve.t, t);
    }

    #[test]
    fn normalization_works_on_a_copy() {
        let truth = RelaxationParams {
            y0: 50.0,
            s: 0.0,
            t1: 1.0e5,
            r: 1.0,
        };
        let (t, y) = synthetic(&truth);
        let opts = FitOptions {
            normalize: true,
            ..FitOptions::default()
        };
        let fit = fit_relaxation(&t, &y, &opts).unwrap();
        let max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(fit.normalized);
        assert!((fit.observed[0] - y[0] / max).abs() < 1e-12);
        assert!(rel(fit.params.y0, 50.0 / max) < 0.01);
    }

    #[test]
    fn bounds_follow_the_data() {
        let b = parameter_bounds(&[10.0, 1000.0], &[2.0, 5.0]).unwrap();
        assert_eq!(b[0], (0.0, 50.0));
        assert_eq!(b[1], (-1.0, 10.0));
        assert_eq!(b[2], (1.0, 10_000.0));
        assert_eq!(b[3], (0.99, 1.01));
        // A zero delay still leaves a positive T1 floor.
        assert!(parameter_bounds(&[0.0, 10.0], &[1.0, 1.0]).unwrap()[2].0 > 0.0);
    }

    #[test]
    fn non_positive_intensities_cannot_be_bounded() {
        let err = parameter_bounds(&[1.0, 2.0], &[-1.0, 0.0]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NUMERIC);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(fit_relaxation(&[1.0, 2.0], &[1.0], &FitOptions::default()).is_err());
        assert!(fit_relaxation(&[], &[], &FitOptions::default()).is_err());
    }

    #[test]
    fn fewer_points_than_parameters_is_rejected() {
        let err = fit_relaxation(&[10.0, 100.0], &[1.0, 2.0], &FitOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NUMERIC);
        let err = fit_relaxation(&[10.0, 100.0, 1000.0], &[1.0, 2.0, 3.0], &FitOptions::default()).unwrap_err();
        assert!(err.message().contains("at least 4"));
    }

    #[test]
    fn too_few_generations_is_a_labeled_failure() {
        let truth = RelaxationParams {
            y0: 100.0,
            s: 0.0,
            t1: 2.0e6,
            r: 1.0,
        };
        let (t, y) = synthetic(&truth);
        let opts = FitOptions {
            max_generations: 1,
            ..FitOptions::default()
        };
        let err = fit_relaxation(&t, &y, &opts).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NUMERIC);
        assert!(err.message().contains("did not converge"));
    }
}
