//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages by value or by borrow
//! - printed as a JSON report
//! - reused as warm-start seeds between fits

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Smoothing filter applied to each FID trace before phase rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Identity kernel; only the phase rotation is applied.
    None,
    /// Normal density sampled over ±3σ with `2·width+1` taps.
    Gaussian,
    /// Causal half of the Gaussian kernel (zero for negative offsets).
    HalfGaussian,
    /// Normalized sinc spanning the whole record, narrowed by `width`.
    #[default]
    Sinc,
    /// Wrap-boundary median filter of size `width` on each channel.
    Median,
}

impl FilterKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FilterKind::None => "None",
            FilterKind::Gaussian => "Gaussian",
            FilterKind::HalfGaussian => "Half-Gaussian",
            FilterKind::Sinc => "Sinc",
            FilterKind::Median => "Median",
        }
    }
}

/// Filter selection plus its single integer width parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub kind: FilterKind,
    pub width: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::Sinc,
            width: 12,
        }
    }
}

impl FilterConfig {
    pub fn none() -> Self {
        Self {
            kind: FilterKind::None,
            width: 0,
        }
    }
}

/// Relaxation law used by the nonlinear fitter.
///
/// Only the spin-7/2 recovery is modeled; the enum keeps the selection explicit
/// at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RelaxationModel {
    /// `y0·(1 − (1+s)·Σ p_k exp(−(q_k t/T1)^r))` with the four spin-7/2 rates.
    #[default]
    #[value(name = "spin-7-2")]
    #[serde(rename = "spin-7-2")]
    Spin72,
}

impl RelaxationModel {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            RelaxationModel::Spin72 => "7/2 Spin",
        }
    }

    /// Labels of the fitted parameters, in parameter-vector order.
    pub fn param_labels(self) -> [&'static str; 4] {
        match self {
            RelaxationModel::Spin72 => ["y0", "s", "T1", "r"],
        }
    }

    pub fn param_count(self) -> usize {
        self.param_labels().len()
    }
}

/// Fitted parameters of the spin-7/2 recovery law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationParams {
    /// Saturated amplitude `γ0`.
    pub y0: f64,
    /// Inversion fraction; `0` is a saturation recovery, `1` a full inversion.
    pub s: f64,
    /// Spin-lattice relaxation time (μs).
    #[serde(rename = "T1")]
    pub t1: f64,
    /// Stretching exponent (pinned near 1).
    pub r: f64,
}

impl RelaxationParams {
    pub fn to_array(self) -> [f64; 4] {
        [self.y0, self.s, self.t1, self.r]
    }

    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [y0, s, t1, r] => Some(Self {
                y0: *y0,
                s: *s,
                t1: *t1,
                r: *r,
            }),
            _ => None,
        }
    }
}

/// `(t, y)` samples of a fitted curve, kept as two parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveSamples {
    pub t: Vec<f64>,
    pub y: Vec<f64>,
}

/// Output of one relaxation fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaxationFit {
    pub model: RelaxationModel,
    pub params: RelaxationParams,
    /// Fitted curve evaluated at the input delay times.
    pub curve: CurveSamples,
    /// Intensities the curve was fitted against (normalized if requested).
    pub observed: Vec<f64>,
    pub normalized: bool,
    pub sse: f64,
    pub rmse: f64,
    pub generations: usize,
}

impl RelaxationFit {
    /// `(label, value)` pairs in display order.
    pub fn labeled_params(&self) -> Vec<(&'static str, f64)> {
        self.model
            .param_labels()
            .into_iter()
            .zip(self.params.to_array())
            .collect()
    }
}

/// Relaxation-time distribution recovered for a single regularization strength.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IltCurve {
    pub alpha: f64,
    /// Log-spaced T1 grid (μs).
    pub t1_grid: Vec<f64>,
    /// Solved distribution divided by its own sum.
    pub distribution: Vec<f64>,
    /// Objective value `‖y − K·P‖² + α‖P‖²` at the solution.
    pub objective: f64,
    pub iterations: usize,
}

impl IltCurve {
    /// Grid index of the largest weight (first on ties).
    pub fn peak_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in self.distribution.iter().enumerate() {
            if best.is_none_or(|(_, b)| v > b) {
                best = Some((i, v));
            }
        }
        best.map(|(i, _)| i)
    }

    /// T1 value at the peak of the distribution.
    pub fn peak_t1(&self) -> Option<f64> {
        self.peak_index().map(|i| self.t1_grid[i])
    }
}

/// A regularization strength whose solve failed and was left out of the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IltSkip {
    pub alpha: f64,
    pub reason: String,
}

/// Result of the full regularization sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IltSweep {
    pub curves: Vec<IltCurve>,
    pub skipped: Vec<IltSkip>,
}

/// Outcome of an optional pipeline stage.
///
/// Stages that depend on optional metadata are `Skipped`; stages whose solver
/// gave up are `Failed`. Neither aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum StageOutcome<T> {
    Completed(T),
    Failed(String),
    Skipped(String),
}

impl<T> StageOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            StageOutcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Completed(_) => "completed",
            StageOutcome::Failed(_) => "FAILED",
            StageOutcome::Skipped(_) => "skipped",
        }
    }
}

/// Where the analysed record set comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// JSON point-group container on disk.
    Container(PathBuf),
    /// Deterministic synthetic dataset.
    Synthetic(SynthConfig),
}

/// Parameters for the synthetic FID generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Number of points per FID.
    pub points: usize,
    /// Sampling interval (μs).
    pub dwell_us: f64,
    /// True recovery law of the per-record amplitude.
    pub params: RelaxationParams,
    /// Transverse decay constant of each FID (μs).
    pub t2_us: f64,
    /// Resonance offset (MHz).
    pub offset_mhz: f64,
    /// Receiver phase applied to every trace (degrees).
    pub phase_deg: f64,
    /// Standard deviation of additive Gaussian noise, per channel.
    pub noise: f64,
    pub seed: u64,
    /// Optional constant field metadata (Oe).
    pub field: Option<f64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            points: 1024,
            dwell_us: 0.2,
            params: RelaxationParams {
                y0: 100.0,
                s: 0.0,
                t1: 1.0e6,
                r: 1.0,
            },
            t2_us: 20.0,
            offset_mhz: 0.0,
            phase_deg: 0.0,
            noise: 0.0,
            seed: 42,
            field: None,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub source: DataSource,
    pub filter: FilterConfig,

    /// Broadcast phase (degrees) applied before anything else.
    pub phase: Option<f64>,
    /// Run autophase on this record index.
    pub autophase_index: Option<usize>,
    /// Broadcast pivot time (μs).
    pub pivot: Option<f64>,

    /// Spectral integration window `(left, right)` in MHz; order is not assumed.
    pub spectral_pivots: (f64, f64),

    pub model: RelaxationModel,
    pub normalize: bool,
    pub seed: u64,
    pub max_generations: usize,

    pub ilt: bool,

    pub json: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            source: DataSource::Synthetic(SynthConfig::default()),
            filter: FilterConfig::default(),
            phase: None,
            autophase_index: None,
            pivot: None,
            spectral_pivots: (-0.5, 0.5),
            model: RelaxationModel::Spin72,
            normalize: false,
            seed: 42,
            max_generations: 1000,
            ilt: true,
            json: false,
            plot: true,
            plot_width: 100,
            plot_height: 25,
        }
    }
}
