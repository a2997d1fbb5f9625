//! Model evaluation for the spin-7/2 recovery law.
//!
//! The fitter and the inverse Laplace solver rely on two primitive operations:
//! - predict `y(t)` given `(y0, s, T1, r)` (for SSE, residuals, overlay curves)
//! - a kernel entry for one delay time and one candidate T1 (for the ILT matrix)
//!
//! Both share the same four decay channels. For a spin-7/2 nucleus the allowed
//! transitions relax at rates `q_k / T1` with weights `p_k`, and the weights sum
//! to one.

use crate::domain::{RelaxationModel, RelaxationParams};

/// Relative decay rates `q_k` of the spin-7/2 channels.
pub const SPIN_7_2_RATES: [f64; 4] = [1.0, 6.0, 15.0, 28.0];

/// Channel weights `p_k` of the spin-7/2 recovery.
pub const SPIN_7_2_WEIGHTS: [f64; 4] = [1.0 / 84.0, 3.0 / 44.0, 75.0 / 364.0, 1225.0 / 1716.0];

/// `Σ p_k · exp(−(q_k·t/T1)^r)`.
///
/// Equals 1 at `t = 0` and decays to 0 as `t → ∞`.
pub fn decay_mixture(t: f64, t1: f64, r: f64) -> f64 {
    SPIN_7_2_RATES
        .iter()
        .zip(SPIN_7_2_WEIGHTS.iter())
        .map(|(&q, &p)| p * (-(q * t / t1).powf(r)).exp())
        .sum()
}

/// Predict the integrated intensity at delay `t`.
pub fn predict(model: RelaxationModel, t: f64, params: &RelaxationParams) -> f64 {
    match model {
        RelaxationModel::Spin72 => {
            params.y0 * (1.0 - (1.0 + params.s) * decay_mixture(t, params.t1, params.r))
        }
    }
}

/// Same as [`predict`] but on a raw parameter vector `[y0, s, T1, r]`.
///
/// Used inside the optimizer where parameters live in a plain slice.
///
/// # Panics
/// Panics if `params` is shorter than `model.param_count()`.
pub fn predict_raw(model: RelaxationModel, t: f64, params: &[f64]) -> f64 {
    match model {
        RelaxationModel::Spin72 => {
            params[0] * (1.0 - (1.0 + params[1]) * decay_mixture(t, params[2], params[3]))
        }
    }
}

/// ILT kernel entry `Σ_k (1 − 2·p_k·exp(−q_k·t/T1))`.
pub fn kernel_entry(t: f64, t1: f64) -> f64 {
    SPIN_7_2_RATES
        .iter()
        .zip(SPIN_7_2_WEIGHTS.iter())
        .map(|(&q, &p)| 1.0 - 2.0 * p * (-q * t / t1).exp())
        .sum()
}
