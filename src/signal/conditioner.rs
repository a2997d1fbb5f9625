//! Per-record smoothing and phase rotation.
//!
//! Every record is truncated to the common prefix length `L`, smoothed with the
//! configured filter, then rotated by `exp(i·phase)`. Output is recomputed on
//! every call from whatever phase snapshot the caller passes in.

use std::f64::consts::PI;

use num_complex::Complex64;
use rayon::prelude::*;

use crate::data::RecordSet;
use crate::domain::{FilterConfig, FilterKind};
use crate::error::AppError;
use crate::math::linspace;

/// One conditioned trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionedRecord {
    /// Time axis truncated to the common length (μs).
    pub times: Vec<f64>,
    pub signal: Vec<Complex64>,
}

/// Conditioned traces, all of length `len`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionedSet {
    pub len: usize,
    pub records: Vec<ConditionedRecord>,
}

/// How a trace is smoothed before rotation.
#[derive(Debug, Clone, PartialEq)]
pub enum Smoother {
    /// Circular convolution with a unit-sum kernel.
    Kernel(Vec<f64>),
    /// Wrap-boundary median of the given size, per channel.
    Median(usize),
}

impl Smoother {
    pub fn new(filter: &FilterConfig, len: usize) -> Self {
        match filter.kind {
            FilterKind::Median => Smoother::Median(filter.width),
            kind => Smoother::Kernel(build_kernel(kind, filter.width, len)),
        }
    }

    pub fn apply(&self, signal: &[Complex64]) -> Vec<Complex64> {
        match self {
            Smoother::Kernel(kernel) => circular_convolve(signal, kernel),
            Smoother::Median(size) => {
                let re: Vec<f64> = signal.iter().map(|c| c.re).collect();
                let im: Vec<f64> = signal.iter().map(|c| c.im).collect();
                median_filter_wrap(&re, *size)
                    .into_iter()
                    .zip(median_filter_wrap(&im, *size))
                    .map(|(re, im)| Complex64::new(re, im))
                    .collect()
            }
        }
    }
}

/// Condition every record with its entry from `phases` (degrees).
pub fn condition(
    records: &RecordSet,
    phases: &[f64],
    filter: &FilterConfig,
) -> Result<ConditionedSet, AppError> {
    if phases.len() != records.len() {
        return Err(AppError::input(format!(
            "Phase set has {} entries for {} records.",
            phases.len(),
            records.len()
        )));
    }
    let len = records.common_len();
    let smoother = Smoother::new(filter, len);

    let conditioned = records
        .records()
        .par_iter()
        .zip(phases.par_iter())
        .map(|(record, &phase)| ConditionedRecord {
            times: record.times[..len].to_vec(),
            signal: condition_signal(&record.complex_prefix(len), phase, &smoother),
        })
        .collect();

    Ok(ConditionedSet {
        len,
        records: conditioned,
    })
}

/// Smooth then rotate a single trace.
pub fn condition_signal(signal: &[Complex64], phase_deg: f64, smoother: &Smoother) -> Vec<Complex64> {
    let rotation = Complex64::from_polar(1.0, phase_deg.to_radians());
    smoother.apply(signal).into_iter().map(|c| c * rotation).collect()
}

/// Unit-sum smoothing kernel for the convolution filters.
///
/// `Median` has no kernel and yields the identity here. A kernel whose weights
/// sum to zero (a width-0 half-Gaussian) also falls back to the identity.
pub fn build_kernel(kind: FilterKind, width: usize, len: usize) -> Vec<f64> {
    let taps = 2 * width + 1;
    let raw: Vec<f64> = match kind {
        FilterKind::None | FilterKind::Median => return vec![1.0],
        FilterKind::Gaussian => linspace(-3.0, 3.0, taps)
            .into_iter()
            .map(|x| (-0.5 * x * x).exp())
            .collect(),
        FilterKind::HalfGaussian => linspace(-3.0, 3.0, taps)
            .into_iter()
            .map(|x| if x >= 0.0 { (-0.5 * x * x).exp() } else { 0.0 })
            .collect(),
        FilterKind::Sinc => {
            let span = len as f64 / taps as f64;
            linspace(-span, span, len).into_iter().map(sinc).collect()
        }
    };

    let total: f64 = raw.iter().sum();
    if !(total.is_finite() && total.abs() > f64::EPSILON) {
        return vec![1.0];
    }
    raw.into_iter().map(|w| w / total).collect()
}

/// Normalized sinc, `sin(πx)/(πx)`.
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Circular "same" convolution: output sample `n` is centered on input `n`.
pub fn circular_convolve(signal: &[Complex64], kernel: &[f64]) -> Vec<Complex64> {
    let n = signal.len();
    if n == 0 || kernel.is_empty() {
        return signal.to_vec();
    }
    let center = (kernel.len() - 1) / 2;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter(|(_, w)| **w != 0.0)
                .map(|(k, &w)| {
                    let j = (i as isize + center as isize - k as isize).rem_euclid(n as isize) as usize;
                    signal[j] * w
                })
                .sum()
        })
        .collect()
}

/// Median over a window of `size` samples with wrap-around boundaries.
///
/// The window for sample `n` starts at `n − size/2`; for even sizes the upper
/// of the two middle values is taken. Sizes below 2 return the input.
pub fn median_filter_wrap(values: &[f64], size: usize) -> Vec<f64> {
    let n = values.len();
    if size <= 1 || n == 0 {
        return values.to_vec();
    }
    let half = (size / 2) as isize;
    let mut window = vec![0.0; size];
    (0..n)
        .map(|i| {
            for (k, slot) in window.iter_mut().enumerate() {
                let j = (i as isize - half + k as isize).rem_euclid(n as isize) as usize;
                *slot = values[j];
            }
            window.sort_by(|a, b| a.total_cmp(b));
            window[size / 2]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FidRecord;

    fn ramp_set() -> RecordSet {
        let a = FidRecord::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0.5, 0.0, -0.5, 0.0, 0.5],
        )
        .unwrap();
        let b = FidRecord::new(vec![0.0, 1.0, 2.0, 3.0], vec![4.0, 3.0, 2.0, 1.0], vec![0.0; 4]).unwrap();
        RecordSet::new(vec![a, b])
    }

    #[test]
    fn kernels_have_unit_sum() {
        for kind in [FilterKind::None, FilterKind::Gaussian, FilterKind::HalfGaussian, FilterKind::Sinc] {
            for width in [0usize, 1, 3, 12, 40] {
                let kernel = build_kernel(kind, width, 256);
                let total: f64 = kernel.iter().sum();
                assert!((total - 1.0).abs() < 1e-12, "{kind:?} width {width}: sum {total}");
            }
        }
    }

    #[test]
    fn gaussian_kernel_is_symmetric_and_half_gaussian_is_causal() {
        let g = build_kernel(FilterKind::Gaussian, 4, 0);
        assert_eq!(g.len(), 9);
        for k in 0..4 {
            assert!((g[k] - g[8 - k]).abs() < 1e-15);
        }
        let h = build_kernel(FilterKind::HalfGaussian, 4, 0);
        assert!(h[..4].iter().all(|&w| w == 0.0));
        assert!(h[4] > h[8]);
    }

    #[test]
    fn sinc_kernel_spans_the_record() {
        let kernel = build_kernel(FilterKind::Sinc, 12, 300);
        assert_eq!(kernel.len(), 300);
    }

    #[test]
    fn identity_filter_only_rotates() {
        let set = ramp_set();
        let out = condition(&set, &[90.0, 0.0], &FilterConfig::none()).unwrap();
        assert_eq!(out.len, 4);
        let raw = set.record(0).unwrap().complex_prefix(4);
        for (c, r) in out.records[0].signal.iter().zip(raw.iter()) {
            let expected = r * Complex64::new(0.0, 1.0);
            assert!((c - expected).norm() < 1e-12);
        }
        assert_eq!(out.records[1].signal, set.record(1).unwrap().complex_prefix(4));
        assert_eq!(out.records[0].times, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn width_zero_gaussian_is_identity() {
        let set = ramp_set();
        let filter = FilterConfig {
            kind: FilterKind::Gaussian,
            width: 0,
        };
        let out = condition(&set, &[0.0, 0.0], &filter).unwrap();
        let raw = set.record(1).unwrap().complex_prefix(4);
        for (c, r) in out.records[1].signal.iter().zip(raw.iter()) {
            assert!((c - r).norm() < 1e-12);
        }
    }

    #[test]
    fn convolution_wraps_around() {
        let signal = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(0.0, 0.0),
        ];
        let out = circular_convolve(&signal, &[0.25, 0.5, 0.25]);
        let re: Vec<f64> = out.iter().map(|c| c.re).collect();
        assert_eq!(re, vec![0.5, 0.25, 0.0, 0.25]);
    }

    #[test]
    fn median_filter_removes_spikes_with_wrap() {
        let v = [1.0, 1.0, 9.0, 1.0, 1.0];
        assert_eq!(median_filter_wrap(&v, 3), vec![1.0; 5]);
        let edge = [9.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(median_filter_wrap(&edge, 3)[0], 1.0);
        assert_eq!(median_filter_wrap(&v, 1), v.to_vec());
    }

    #[test]
    fn even_median_takes_the_upper_middle_value() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(median_filter_wrap(&v, 4), vec![5.0, 3.0, 3.0, 4.0, 5.0, 5.0]);
    }

    #[test]
    fn phase_set_length_must_match() {
        assert!(condition(&ramp_set(), &[0.0], &FilterConfig::none()).is_err());
    }
}
