//! Command-line parsing for the TNMR relaxation analyser.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the signal-processing and fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{FilterKind, RelaxationModel, RelaxationParams, SynthConfig};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tnmr", version, about = "Pulsed-NMR T1 relaxation analysis for TNMR datasets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Condition, integrate and fit a dataset; print the report and charts.
    Fit(FitArgs),
    /// Write a synthetic point-group container as JSON.
    Synth(SynthArgs),
}

/// Options for the analysis pipeline.
#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// JSON point-group container. A synthetic dataset is generated when omitted.
    #[arg(short = 'i', long, value_name = "JSON")]
    pub input: Option<PathBuf>,

    /// Smoothing filter applied before phase rotation.
    #[arg(long, value_enum, default_value_t = FilterKind::Sinc)]
    pub filter: FilterKind,

    /// Filter width parameter.
    #[arg(long, default_value_t = 12)]
    pub filter_width: usize,

    /// Phase (degrees) applied to every record.
    #[arg(long, allow_hyphen_values = true)]
    pub phase: Option<f64>,

    /// Autophase on this record index; the result is applied to all records.
    #[arg(long, value_name = "INDEX")]
    pub autophase: Option<usize>,

    /// Pivot time (μs) applied to every record.
    #[arg(long, allow_hyphen_values = true)]
    pub pivot: Option<f64>,

    /// Left spectral pivot (MHz).
    #[arg(long, default_value_t = -0.5, allow_hyphen_values = true)]
    pub left: f64,

    /// Right spectral pivot (MHz).
    #[arg(long, default_value_t = 0.5, allow_hyphen_values = true)]
    pub right: f64,

    /// Relaxation law to fit.
    #[arg(long, value_enum, default_value_t = RelaxationModel::Spin72)]
    pub model: RelaxationModel,

    /// Divide intensities by their maximum before fitting.
    #[arg(long)]
    pub normalize: bool,

    /// Seed for the differential-evolution population.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Generation cap for differential evolution.
    #[arg(long, default_value_t = 1000)]
    pub max_generations: usize,

    /// Skip the inverse Laplace sweep.
    #[arg(long)]
    pub no_ilt: bool,

    /// Print a JSON report instead of text.
    #[arg(long)]
    pub json: bool,

    /// Render ASCII plots in the terminal (enabled by default).
    #[arg(long, default_value_t = true)]
    pub plot: bool,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    #[command(flatten)]
    pub synth: SynthOptions,
}

/// Options for the `synth` subcommand.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output path; stdout when omitted.
    #[arg(short = 'o', long, value_name = "JSON")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub synth: SynthOptions,
}

/// Synthetic dataset parameters, shared by `fit` (no `--input`) and `synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthOptions {
    /// Points per FID.
    #[arg(long, default_value_t = 1024)]
    pub points: usize,

    /// Sampling interval (μs).
    #[arg(long, default_value_t = 0.2)]
    pub dwell: f64,

    /// True T1 (μs).
    #[arg(long, default_value_t = 1.0e6)]
    pub t1: f64,

    /// True amplitude.
    #[arg(long, default_value_t = 100.0)]
    pub y0: f64,

    /// True inversion offset.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub inversion: f64,

    /// Transverse decay constant (μs).
    #[arg(long, default_value_t = 20.0)]
    pub t2: f64,

    /// Resonance offset (MHz).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub offset: f64,

    /// Receiver phase baked into the traces (degrees).
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub synth_phase: f64,

    /// Gaussian noise standard deviation per channel.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Seed for the noise generator.
    #[arg(long, default_value_t = 42)]
    pub synth_seed: u64,

    /// Constant field metadata (Oe).
    #[arg(long)]
    pub field: Option<f64>,
}

impl SynthOptions {
    pub fn to_config(&self) -> SynthConfig {
        SynthConfig {
            points: self.points,
            dwell_us: self.dwell,
            params: RelaxationParams {
                y0: self.y0,
                s: self.inversion,
                t1: self.t1,
                r: 1.0,
            },
            t2_us: self.t2,
            offset_mhz: self.offset,
            phase_deg: self.synth_phase,
            noise: self.noise,
            seed: self.synth_seed,
            field: self.field,
        }
    }
}
