//! Shared analysis pipeline.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! records -> session -> (autophase) -> conditioning -> spectra -> integrals ->
//! relaxation fit + ILT sweep, with the field scan alongside.
//!
//! Optional stages never abort the run: each one reports `Completed`, `Skipped`
//! (missing metadata or disabled) or `Failed` (solver gave up).

use serde::Serialize;

use crate::data::{RecordSet, generate_sample};
use crate::domain::{DataSource, FitConfig, IltSweep, RelaxationFit, StageOutcome};
use crate::error::AppError;
use crate::fit::{FitOptions, IltOptions, fit_relaxation, inverse_laplace_sweep};
use crate::io::load_container;
use crate::session::Session;
use crate::signal::{
    AutophaseOutcome, FieldScanPoint, IntegrationWindow, autophase, condition, field_scan, integrate,
    integration_window, transform,
};

/// All computed outputs of a single analysis pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub records: usize,
    /// Common trace length every stage worked on.
    pub samples: usize,
    pub autophase: Option<AutophaseOutcome>,
    pub phases: Vec<f64>,
    pub pivots: Vec<f64>,
    pub spectral_pivots: (f64, f64),
    pub window: Option<IntegrationWindow>,
    pub delay_times: Option<Vec<f64>>,
    pub intensities: Vec<f64>,
    pub fit: StageOutcome<RelaxationFit>,
    pub ilt: StageOutcome<IltSweep>,
    pub field_scan: StageOutcome<Vec<FieldScanPoint>>,
}

/// Load the record set named by `source`.
pub fn load_records(source: &DataSource) -> Result<RecordSet, AppError> {
    match source {
        DataSource::Container(path) => {
            log::info!("Loading container {}", path.display());
            Ok(load_container(path)?.records)
        }
        DataSource::Synthetic(synth) => {
            log::info!("Generating synthetic dataset (seed {}).", synth.seed);
            generate_sample(synth)
        }
    }
}

/// Build a session and apply the configured broadcast phase and pivot.
pub fn session_from_config(records: RecordSet, config: &FitConfig) -> Result<Session, AppError> {
    let mut session = Session::new(records);
    session.set_filter(config.filter);
    session.set_spectral_pivots(config.spectral_pivots.0, config.spectral_pivots.1);
    session.set_normalize(config.normalize);
    if let Some(phase) = config.phase {
        session.set_all_phases(phase)?;
    }
    if let Some(pivot) = config.pivot {
        session.set_all_pivots(pivot)?;
    }
    Ok(session)
}

/// Load, build a session, and analyse it once.
pub fn run_fit(config: &FitConfig) -> Result<(Session, RunOutput), AppError> {
    let records = load_records(&config.source)?;
    if records.is_empty() {
        return Err(AppError::no_data("Record set is empty."));
    }
    let mut session = session_from_config(records, config)?;
    let output = run_analysis(&mut session, config)?;
    Ok((session, output))
}

/// Run every stage against the session's current state.
///
/// Autophase (when requested) is the only stage that writes to the session,
/// plus the remembered fit on success.
pub fn run_analysis(session: &mut Session, config: &FitConfig) -> Result<RunOutput, AppError> {
    let filter = session.filter();

    let autophase = match config.autophase_index {
        Some(index) => autophase(session, index, &filter)?,
        None => None,
    };

    let phases = session.phases();
    let pivots = session.pivots();
    let conditioned = condition(session.records(), &phases, &filter)?;
    log::info!(
        "Conditioned {} records ({} samples, {} filter, width {}).",
        conditioned.records.len(),
        conditioned.len,
        filter.kind.display_name(),
        filter.width
    );

    let field_scan = match field_scan(session.records(), &conditioned, &pivots)? {
        Some(points) => StageOutcome::Completed(points),
        None => StageOutcome::Skipped("no field metadata".to_string()),
    };

    let spectra = transform(&conditioned)?;
    let spectral_pivots = session.spectral_pivots();
    let window = integration_window(&spectra.frequencies, spectral_pivots);
    let intensities = integrate(&spectra, spectral_pivots)?;

    let delay_times = session.records().delay_time().map(<[f64]>::to_vec);

    let fit = match &delay_times {
        None => StageOutcome::Skipped("no delay-time metadata".to_string()),
        Some(delays) => {
            let opts = FitOptions {
                model: config.model,
                normalize: session.normalize(),
                seed: config.seed,
                max_generations: config.max_generations,
                warm_start: session.warm_start(),
            };
            match fit_relaxation(delays, &intensities, &opts) {
                Ok(fit) => {
                    session.remember_fit(fit.params);
                    StageOutcome::Completed(fit)
                }
                Err(e) => {
                    log::warn!("Relaxation fit failed: {e}");
                    StageOutcome::Failed(e.message().to_string())
                }
            }
        }
    };

    let ilt = match &delay_times {
        _ if !config.ilt => StageOutcome::Skipped("disabled".to_string()),
        None => StageOutcome::Skipped("no delay-time metadata".to_string()),
        Some(delays) => match inverse_laplace_sweep(delays, &intensities, &IltOptions::default()) {
            Ok(sweep) => StageOutcome::Completed(sweep),
            Err(e) => {
                log::warn!("ILT sweep failed: {e}");
                StageOutcome::Failed(e.message().to_string())
            }
        },
    };

    Ok(RunOutput {
        records: session.len(),
        samples: conditioned.len,
        autophase,
        phases: session.phases().to_vec(),
        pivots: session.pivots().to_vec(),
        spectral_pivots,
        window,
        delay_times,
        intensities,
        fit,
        ilt,
        field_scan,
    })
}
