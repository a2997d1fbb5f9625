//! Shared analysis state.
//!
//! The session owns the record set and the two per-record arrays every stage
//! reads: the global phase set (degrees, stored wrapped into (−180, 180]) and
//! the pivot set (μs). Readers get immutable `Arc<[f64]>` snapshots; writers go
//! through the narrow `set_*` API, which bumps `revision()` so callers can tell
//! when derived data went stale.

use std::sync::Arc;

use crate::data::RecordSet;
use crate::domain::{FilterConfig, RelaxationParams};
use crate::error::AppError;
use crate::signal::wrap_phase;

#[derive(Debug, Clone)]
pub struct Session {
    records: RecordSet,
    phases: Arc<[f64]>,
    pivots: Arc<[f64]>,
    filter: FilterConfig,
    spectral_pivots: (f64, f64),
    normalize: bool,
    last_fit: Option<RelaxationParams>,
    revision: u64,
}

impl Session {
    /// Start a session with zero phase and zero pivot for every record.
    pub fn new(records: RecordSet) -> Self {
        let n = records.len();
        Self {
            records,
            phases: vec![0.0; n].into(),
            pivots: vec![0.0; n].into(),
            filter: FilterConfig::default(),
            spectral_pivots: (-0.5, 0.5),
            normalize: false,
            last_fit: None,
            revision: 0,
        }
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn phases(&self) -> Arc<[f64]> {
        Arc::clone(&self.phases)
    }

    pub fn pivots(&self) -> Arc<[f64]> {
        Arc::clone(&self.pivots)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn set_phase(&mut self, index: usize, degrees: f64) -> Result<(), AppError> {
        let value = finite("phase", degrees)?;
        self.phases = replace_one(&self.phases, index, wrap_phase(value), "phase")?;
        self.touch();
        Ok(())
    }

    pub fn set_all_phases(&mut self, degrees: f64) -> Result<(), AppError> {
        let value = wrap_phase(finite("phase", degrees)?);
        self.phases = vec![value; self.len()].into();
        self.touch();
        Ok(())
    }

    pub fn set_pivot(&mut self, index: usize, time_us: f64) -> Result<(), AppError> {
        let value = finite("pivot", time_us)?;
        self.pivots = replace_one(&self.pivots, index, value, "pivot")?;
        self.touch();
        Ok(())
    }

    pub fn set_all_pivots(&mut self, time_us: f64) -> Result<(), AppError> {
        let value = finite("pivot", time_us)?;
        self.pivots = vec![value; self.len()].into();
        self.touch();
        Ok(())
    }

    pub fn filter(&self) -> FilterConfig {
        self.filter
    }

    pub fn set_filter(&mut self, filter: FilterConfig) {
        self.filter = filter;
        self.touch();
    }

    /// Spectral integration window as given (unordered).
    pub fn spectral_pivots(&self) -> (f64, f64) {
        self.spectral_pivots
    }

    pub fn set_spectral_pivots(&mut self, left: f64, right: f64) {
        self.spectral_pivots = (left, right);
        self.touch();
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn set_normalize(&mut self, normalize: bool) {
        self.normalize = normalize;
    }

    pub fn last_fit(&self) -> Option<&RelaxationParams> {
        self.last_fit.as_ref()
    }

    /// Keep a successful fit; it seeds the next one.
    pub fn remember_fit(&mut self, params: RelaxationParams) {
        self.last_fit = Some(params);
    }

    pub fn warm_start(&self) -> Option<[f64; 4]> {
        self.last_fit.map(RelaxationParams::to_array)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

fn finite(name: &str, value: f64) -> Result<f64, AppError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::input(format!("{name} must be finite (got {value}).")))
    }
}

fn replace_one(current: &[f64], index: usize, value: f64, name: &str) -> Result<Arc<[f64]>, AppError> {
    if index >= current.len() {
        return Err(AppError::input(format!(
            "Record index {index} out of range for {name} set of {} records.",
            current.len()
        )));
    }
    let mut next = current.to_vec();
    next[index] = value;
    Ok(next.into())
}
