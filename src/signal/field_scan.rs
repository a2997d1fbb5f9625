//! Time-domain integrals against the magnetic field.

use serde::Serialize;

use crate::data::RecordSet;
use crate::error::AppError;
use crate::signal::conditioner::ConditionedSet;
use crate::signal::spectrum::nearest_index;

/// One record's summary in a field scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldScanPoint {
    pub field: f64,
    pub real_integral: f64,
    pub imag_integral: f64,
    /// `|Σ real + i·Σ imag|`.
    pub integral_magnitude: f64,
    /// `Σ |c|`.
    pub magnitude_integral: f64,
    pub pivot_real: f64,
    pub pivot_imag: f64,
    pub pivot_magnitude: f64,
}

/// Summarize each conditioned record against its field value.
///
/// Returns `Ok(None)` when the record set carries no field metadata.
pub fn field_scan(
    records: &RecordSet,
    conditioned: &ConditionedSet,
    pivots: &[f64],
) -> Result<Option<Vec<FieldScanPoint>>, AppError> {
    let Some(field) = records.field() else {
        log::info!("Field scan skipped: no field metadata.");
        return Ok(None);
    };
    if conditioned.records.len() != field.len() || pivots.len() != field.len() {
        return Err(AppError::input(format!(
            "Field scan needs one conditioned trace and pivot per field value ({} fields, {} traces, {} pivots).",
            field.len(),
            conditioned.records.len(),
            pivots.len()
        )));
    }

    let points = conditioned
        .records
        .iter()
        .zip(field.iter().zip(pivots.iter()))
        .map(|(record, (&field, &pivot))| {
            let real_integral: f64 = record.signal.iter().map(|c| c.re).sum();
            let imag_integral: f64 = record.signal.iter().map(|c| c.im).sum();
            let magnitude_integral: f64 = record.signal.iter().map(|c| c.norm()).sum();
            let at_pivot = nearest_index(&record.times, pivot)
                .map(|i| record.signal[i])
                .unwrap_or_default();
            FieldScanPoint {
                field,
                real_integral,
                imag_integral,
                integral_magnitude: real_integral.hypot(imag_integral),
                magnitude_integral,
                pivot_real: at_pivot.re,
                pivot_imag: at_pivot.im,
                pivot_magnitude: at_pivot.norm(),
            }
        })
        .collect();
    Ok(Some(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FidRecord;
    use crate::domain::FilterConfig;
    use crate::signal::condition;

    fn records() -> RecordSet {
        let a = FidRecord::new(vec![0.0, 1.0, 2.0], vec![3.0, 1.0, 0.0], vec![0.0, 4.0, 1.0]).unwrap();
        let b = FidRecord::new(vec![0.0, 1.0, 2.0], vec![1.0, 1.0, 1.0], vec![0.0; 3]).unwrap();
        RecordSet::new(vec![a, b])
    }

    #[test]
    fn missing_field_skips_the_scan() {
        let set = records();
        let c = condition(&set, &[0.0, 0.0], &FilterConfig::none()).unwrap();
        assert_eq!(field_scan(&set, &c, &[0.0, 0.0]).unwrap(), None);
    }

    #[test]
    fn integrals_and_pivot_samples() {
        let set = records().with_field(vec![100.0, 200.0]).unwrap();
        let c = condition(&set, &[0.0, 0.0], &FilterConfig::none()).unwrap();
        let scan = field_scan(&set, &c, &[0.9, 0.0]).unwrap().unwrap();
        let p = scan[0];
        assert_eq!(p.field, 100.0);
        assert!((p.real_integral - 4.0).abs() < 1e-12);
        assert!((p.imag_integral - 5.0).abs() < 1e-12);
        assert!((p.integral_magnitude - 41f64.sqrt()).abs() < 1e-12);
        assert!((p.magnitude_integral - (3.0 + 17f64.sqrt() + 1.0)).abs() < 1e-12);
        assert!((p.pivot_magnitude - 17f64.sqrt()).abs() < 1e-12);
        assert!((scan[1].real_integral - 3.0).abs() < 1e-12);
    }
}
