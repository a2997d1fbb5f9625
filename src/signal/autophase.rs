//! Peak location and automatic phase correction.

use num_complex::Complex64;
use serde::Serialize;

use crate::domain::FilterConfig;
use crate::error::AppError;
use crate::session::Session;
use crate::signal::conditioner::{Smoother, condition_signal};

/// What an autophase pass found and wrote back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutophaseOutcome {
    /// Record the peak was searched in.
    pub index: usize,
    pub peak_index: usize,
    /// Time of the peak sample (μs); now every record's pivot.
    pub peak_time: f64,
    /// Angle of the peak sample before correction (degrees).
    pub peak_angle: f64,
    /// New phase written to every record (degrees).
    pub phase: f64,
}

/// Map any angle into (−180, 180] degrees.
pub fn wrap_phase(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    if r > 180.0 { r - 360.0 } else { r }
}

/// Index of the largest-magnitude sample; the first one wins ties.
pub fn locate_peak(signal: &[Complex64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, c) in signal.iter().enumerate() {
        let mag = c.norm();
        if best.is_none_or(|(_, m)| mag > m) {
            best = Some((i, mag));
        }
    }
    best.map(|(i, _)| i)
}

/// Zero the phase of the strongest sample of record `index`.
///
/// Conditions record `index` with its current phase, finds the peak, and
/// broadcasts `wrap(current − angle)` to every record's phase and the peak time
/// to every record's pivot. An empty session is left untouched.
pub fn autophase(
    session: &mut Session,
    index: usize,
    filter: &FilterConfig,
) -> Result<Option<AutophaseOutcome>, AppError> {
    if session.is_empty() {
        return Ok(None);
    }
    let record = session.records().record(index).ok_or_else(|| {
        AppError::input(format!(
            "Autophase record index {index} out of range ({} records).",
            session.len()
        ))
    })?;

    let len = session.records().common_len();
    let current = session.phases()[index];
    let smoother = Smoother::new(filter, len);
    let signal = condition_signal(&record.complex_prefix(len), current, &smoother);

    let Some(peak_index) = locate_peak(&signal) else {
        log::warn!("Autophase skipped: record {index} has no samples.");
        return Ok(None);
    };
    let peak = signal[peak_index];
    let peak_time = record.times[peak_index];
    let peak_angle = peak.im.atan2(peak.re).to_degrees();
    let phase = wrap_phase(current - peak_angle);

    session.set_all_phases(phase)?;
    session.set_all_pivots(peak_time)?;
    log::info!(
        "Autophase on record {index}: peak at {peak_time:.3} us, angle {peak_angle:.2} deg, phase -> {phase:.2} deg."
    );

    Ok(Some(AutophaseOutcome {
        index,
        peak_index,
        peak_time,
        peak_angle,
        phase,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FidRecord, RecordSet};

    fn congruent(a: f64, b: f64) -> bool {
        let d = (a - b).rem_euclid(360.0);
        d < 1e-9 || (360.0 - d) < 1e-9
    }

    #[test]
    fn wrap_stays_in_range_and_congruent() {
        let mut v = -2000.0;
        while v <= 2000.0 {
            let w = wrap_phase(v);
            assert!(w > -180.0 && w <= 180.0, "wrap({v}) = {w}");
            assert!(congruent(w, v), "wrap({v}) = {w}");
            v += 7.25;
        }
        assert_eq!(wrap_phase(180.0), 180.0);
        assert_eq!(wrap_phase(-180.0), 180.0);
        assert_eq!(wrap_phase(540.0), 180.0);
        assert_eq!(wrap_phase(-90.0), -90.0);
    }

    #[test]
    fn peak_ties_pick_first() {
        let s = [
            Complex64::new(0.0, 1.0),
            Complex64::new(1.0, 0.0),
            Complex64::new(0.5, 0.0),
        ];
        assert_eq!(locate_peak(&s), Some(0));
        assert_eq!(locate_peak(&[]), None);
    }

    fn session_with_peak(theta_deg: f64) -> Session {
        let times = vec![0.0, 0.5, 1.0, 1.5, 2.0];
        let mags = [0.2, 0.6, 1.0, 0.4, 0.1];
        let rot = Complex64::from_polar(1.0, theta_deg.to_radians());
        let signal: Vec<Complex64> = mags.iter().map(|&m| rot * m).collect();
        let make = || {
            FidRecord::new(
                times.clone(),
                signal.iter().map(|c| c.re).collect(),
                signal.iter().map(|c| c.im).collect(),
            )
            .unwrap()
        };
        Session::new(RecordSet::new(vec![make(), make(), make()]))
    }

    #[test]
    fn autophase_broadcasts_corrected_phase_and_pivot() {
        let mut session = session_with_peak(30.0);
        session.set_phase(1, 10.0).unwrap();
        let outcome = autophase(&mut session, 1, &FilterConfig::none()).unwrap().unwrap();

        // Peak angle seen through the current phase is 30 + 10.
        assert!((outcome.peak_angle - 40.0).abs() < 1e-9);
        assert!((outcome.phase - wrap_phase(10.0 - 40.0)).abs() < 1e-9);
        assert_eq!(outcome.peak_index, 2);
        for &p in session.phases().iter() {
            assert!((p + 30.0).abs() < 1e-9);
        }
        assert_eq!(&*session.pivots(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn autophase_result_wraps() {
        let mut session = session_with_peak(-170.0);
        session.set_all_phases(30.0).unwrap();
        autophase(&mut session, 0, &FilterConfig::none()).unwrap();
        // wrap(30 − (−140)) = wrap(170) = 170.
        assert!((session.phases()[2] - 170.0).abs() < 1e-9);
    }

    #[test]
    fn empty_session_is_a_no_op() {
        let mut session = Session::new(RecordSet::default());
        let rev = session.revision();
        assert_eq!(autophase(&mut session, 0, &FilterConfig::default()).unwrap(), None);
        assert_eq!(session.revision(), rev);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut session = session_with_peak(0.0);
        assert!(autophase(&mut session, 3, &FilterConfig::none()).is_err());
    }
}
