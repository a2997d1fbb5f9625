//! Fourier transform of conditioned traces and spectral-window integration.

use num_complex::Complex64;
use rayon::prelude::*;
use rustfft::FftPlanner;
use serde::Serialize;

use crate::error::AppError;
use crate::signal::conditioner::ConditionedSet;

/// Centered spectra sharing one frequency axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumSet {
    /// Frequency axis (MHz), ascending, zero at index `len/2`.
    pub frequencies: Vec<f64>,
    pub spectra: Vec<Vec<Complex64>>,
}

/// Integration window resolved to axis indices, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrationWindow {
    pub start: usize,
    pub end: usize,
}

/// FFT every conditioned record.
///
/// Spectra are scaled by `1/L` and shifted so zero frequency sits in the middle.
/// The sampling interval comes from the first record's time axis (μs), so the
/// frequency axis is in MHz.
pub fn transform(set: &ConditionedSet) -> Result<SpectrumSet, AppError> {
    let Some(first) = set.records.first() else {
        return Ok(SpectrumSet::default());
    };
    let n = set.len;
    if n < 2 {
        return Err(AppError::no_data("Need at least 2 samples per record for a spectrum."));
    }
    let dt = first.times[1] - first.times[0];
    let frequencies = frequency_axis(n, dt)?;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let scale = 1.0 / n as f64;

    let spectra = set
        .records
        .par_iter()
        .map(|record| {
            let mut buffer = record.signal.clone();
            fft.process(&mut buffer);
            for c in &mut buffer {
                *c *= scale;
            }
            fftshift(&buffer)
        })
        .collect();

    Ok(SpectrumSet {
        frequencies,
        spectra,
    })
}

/// Centered frequency axis for `n` samples spaced `dt` μs apart.
pub fn frequency_axis(n: usize, dt: f64) -> Result<Vec<f64>, AppError> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(AppError::input(format!(
            "Time axis must increase to build a spectrum (dt = {dt})."
        )));
    }
    let half = (n / 2) as f64;
    Ok((0..n).map(|i| (i as f64 - half) / (n as f64 * dt)).collect())
}

/// Move the zero-frequency bin to the center (`len/2`).
pub fn fftshift<T: Copy>(values: &[T]) -> Vec<T> {
    let n = values.len();
    let half = n / 2;
    (0..n).map(|i| values[(i + n - half) % n]).collect()
}

/// Index of the axis value nearest `target`; the first one wins ties.
pub fn nearest_index(axis: &[f64], target: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in axis.iter().enumerate() {
        let d = (v - target).abs();
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// Resolve a pivot pair to a `[start, end)` window; order is not assumed.
pub fn integration_window(frequencies: &[f64], pivots: (f64, f64)) -> Option<IntegrationWindow> {
    let a = nearest_index(frequencies, pivots.0)?;
    let b = nearest_index(frequencies, pivots.1)?;
    Some(IntegrationWindow {
        start: a.min(b),
        end: a.max(b),
    })
}

/// Sum the real part of each spectrum over the pivot window.
pub fn integrate(spectra: &SpectrumSet, pivots: (f64, f64)) -> Result<Vec<f64>, AppError> {
    if !(pivots.0.is_finite() && pivots.1.is_finite()) {
        return Err(AppError::input("Spectral pivots must be finite."));
    }
    let Some(window) = integration_window(&spectra.frequencies, pivots) else {
        return Ok(vec![0.0; spectra.spectra.len()]);
    };
    if window.start == window.end {
        log::warn!("Spectral window is empty (both pivots map to bin {}).", window.start);
    }
    Ok(spectra
        .spectra
        .iter()
        .map(|s| s[window.start..window.end].iter().map(|c| c.re).sum())
        .collect())
}
