//! Synthetic relaxation datasets.
//!
//! Each record is a damped complex exponential whose initial amplitude follows
//! the recovery law at that record's delay time. Delays come from the standard
//! 22-step vendor table so synthetic sets look like real acquisitions.

use std::f64::consts::PI;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::record::{FidRecord, RecordSet};
use crate::domain::{RelaxationModel, SynthConfig};
use crate::error::AppError;
use crate::io::VENDOR_DELAY_TABLE_US;
use crate::math::linspace;
use crate::models::predict;

/// Generate a record set from `config`, one record per vendor delay.
pub fn generate_sample(config: &SynthConfig) -> Result<RecordSet, AppError> {
    generate_with_delays(config, &VENDOR_DELAY_TABLE_US)
}

/// Generate a record set with an explicit delay schedule (μs).
pub fn generate_with_delays(config: &SynthConfig, delays: &[f64]) -> Result<RecordSet, AppError> {
    if config.points < 2 {
        return Err(AppError::input("Synthetic FIDs need at least 2 points."));
    }
    if !(config.dwell_us.is_finite() && config.dwell_us > 0.0) {
        return Err(AppError::input("Dwell time must be finite and > 0."));
    }
    if !(config.t2_us.is_finite() && config.t2_us > 0.0) {
        return Err(AppError::input("T2 must be finite and > 0."));
    }
    if !(config.noise.is_finite() && config.noise >= 0.0) {
        return Err(AppError::input("Noise level must be finite and >= 0."));
    }
    if delays.is_empty() {
        return Err(AppError::input("Synthetic dataset needs at least one delay."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise.max(f64::MIN_POSITIVE))
        .map_err(|e| AppError::numeric(format!("Noise distribution error: {e}")))?;

    let times = linspace(0.0, config.dwell_us * (config.points - 1) as f64, config.points);
    let phase = config.phase_deg.to_radians();

    let mut records = Vec::with_capacity(delays.len());
    for &delay in delays {
        let amplitude = predict(RelaxationModel::Spin72, delay, &config.params);
        let mut reals = Vec::with_capacity(config.points);
        let mut imags = Vec::with_capacity(config.points);
        for &t in &times {
            let envelope = amplitude * (-t / config.t2_us).exp();
            // MHz · μs = cycles.
            let angle = 2.0 * PI * config.offset_mhz * t + phase;
            let (mut re, mut im) = (envelope * angle.cos(), envelope * angle.sin());
            if config.noise > 0.0 {
                re += normal.sample(&mut rng);
                im += normal.sample(&mut rng);
            }
            reals.push(re);
            imags.push(im);
        }
        records.push(FidRecord::new(times.clone(), reals, imags)?);
    }

    let mut set = RecordSet::new(records).with_delay_time(delays.to_vec())?;
    if let Some(field) = config.field {
        set = set.with_field(vec![field; delays.len()])?;
    }
    log::debug!(
        "Generated {} synthetic records of {} points (seed {}).",
        set.len(),
        config.points,
        config.seed
    );
    Ok(set)
}
