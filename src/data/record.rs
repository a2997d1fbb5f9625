//! Typed record set: FID traces plus per-record metadata.
//!
//! A record set is the unit every pipeline stage borrows. Mandatory data are the
//! traces themselves; the three metadata arrays the core understands (`field`,
//! `frequency`, `delay_time`) are optional but, when present, always carry one
//! value per record. Everything else found in a container is kept in `extra` as
//! typed [`MetaValue`]s so nothing is lost on load.

use std::collections::BTreeMap;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One free-induction decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FidRecord {
    /// Time axis (μs), ascending and non-negative.
    pub times: Vec<f64>,
    pub reals: Vec<f64>,
    pub imags: Vec<f64>,
}

impl FidRecord {
    pub fn new(times: Vec<f64>, reals: Vec<f64>, imags: Vec<f64>) -> Result<Self, AppError> {
        if times.len() != reals.len() || times.len() != imags.len() {
            return Err(AppError::input(format!(
                "FID arrays differ in length: times={}, reals={}, imags={}.",
                times.len(),
                reals.len(),
                imags.len()
            )));
        }
        Ok(Self { times, reals, imags })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// `real + i·imag`, truncated to the first `len` samples.
    pub fn complex_prefix(&self, len: usize) -> Vec<Complex64> {
        self.reals
            .iter()
            .zip(self.imags.iter())
            .take(len)
            .map(|(&re, &im)| Complex64::new(re, im))
            .collect()
    }
}

/// Container metadata that is not one of the canonical fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaValue {
    /// Numeric values, concatenated along the record axis on merge.
    Numeric(Vec<f64>),
    /// Nested group, merged key by key.
    Group(BTreeMap<String, MetaValue>),
    /// Anything that could not be read as numbers; collected as-is.
    Opaque(Vec<serde_json::Value>),
}

impl MetaValue {
    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            MetaValue::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&BTreeMap<String, MetaValue>> {
        match self {
            MetaValue::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Merge `other` into `self`.
    ///
    /// Numeric arrays concatenate, groups merge recursively, opaque values collect.
    /// Mismatched kinds degrade both sides to opaque values.
    pub fn merge(&mut self, other: MetaValue) {
        match (self, other) {
            (MetaValue::Numeric(a), MetaValue::Numeric(b)) => a.extend(b),
            (MetaValue::Group(a), MetaValue::Group(b)) => merge_groups(a, b),
            (MetaValue::Opaque(a), MetaValue::Opaque(b)) => a.extend(b),
            (this, other) => {
                let mut values = this.to_json_values();
                values.extend(other.to_json_values());
                *this = MetaValue::Opaque(values);
            }
        }
    }

    fn to_json_values(&self) -> Vec<serde_json::Value> {
        match self {
            MetaValue::Numeric(v) => v.iter().map(|&x| serde_json::Value::from(x)).collect(),
            MetaValue::Group(_) => vec![self.to_json()],
            MetaValue::Opaque(v) => v.clone(),
        }
    }

    /// JSON rendering used when writing containers back out.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            MetaValue::Numeric(v) => serde_json::Value::from(v.clone()),
            MetaValue::Group(g) => serde_json::Value::Object(
                g.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            MetaValue::Opaque(v) => serde_json::Value::Array(v.clone()),
        }
    }
}

/// Merge two metadata groups key by key.
pub fn merge_groups(into: &mut BTreeMap<String, MetaValue>, from: BTreeMap<String, MetaValue>) {
    for (key, value) in from {
        match into.get_mut(&key) {
            Some(existing) => existing.merge(value),
            None => {
                into.insert(key, value);
            }
        }
    }
}

/// An ordered set of FID records with per-record metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    records: Vec<FidRecord>,
    /// Magnetic field per record (`ppms_mf`).
    field: Option<Vec<f64>>,
    /// Observation frequency per record (`obs_freq`, MHz).
    frequency: Option<Vec<f64>>,
    /// Relaxation delay per record (μs).
    delay_time: Option<Vec<f64>>,
    extra: BTreeMap<String, MetaValue>,
}

impl RecordSet {
    pub fn new(records: Vec<FidRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, field: Vec<f64>) -> Result<Self, AppError> {
        self.check_metadata_len("field", field.len())?;
        self.field = Some(field);
        Ok(self)
    }

    pub fn with_frequency(mut self, frequency: Vec<f64>) -> Result<Self, AppError> {
        self.check_metadata_len("frequency", frequency.len())?;
        self.frequency = Some(frequency);
        Ok(self)
    }

    pub fn with_delay_time(mut self, delay_time: Vec<f64>) -> Result<Self, AppError> {
        self.check_metadata_len("delay_time", delay_time.len())?;
        self.delay_time = Some(delay_time);
        Ok(self)
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, MetaValue>) -> Self {
        self.extra = extra;
        self
    }

    fn check_metadata_len(&self, name: &str, len: usize) -> Result<(), AppError> {
        if len != self.records.len() {
            return Err(AppError::input(format!(
                "Metadata '{name}' has {len} values but the record set has {} records.",
                self.records.len()
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[FidRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&FidRecord> {
        self.records.get(index)
    }

    pub fn field(&self) -> Option<&[f64]> {
        self.field.as_deref()
    }

    pub fn frequency(&self) -> Option<&[f64]> {
        self.frequency.as_deref()
    }

    pub fn delay_time(&self) -> Option<&[f64]> {
        self.delay_time.as_deref()
    }

    pub fn extra(&self) -> &BTreeMap<String, MetaValue> {
        &self.extra
    }

    /// Shortest record length; every elementwise consumer truncates to this.
    pub fn common_len(&self) -> usize {
        self.records.iter().map(FidRecord::len).min().unwrap_or(0)
    }

    /// Append `other` after this set's records.
    ///
    /// Canonical metadata present on both sides concatenates; metadata present on
    /// only one side cannot stay one-value-per-record and is dropped.
    pub fn append(&mut self, other: RecordSet) {
        let RecordSet {
            records,
            field,
            frequency,
            delay_time,
            extra,
        } = other;
        let had_records = !self.records.is_empty();
        let adds_records = !records.is_empty();

        self.field = concat_metadata("field", self.field.take(), field, had_records, adds_records);
        self.frequency =
            concat_metadata("frequency", self.frequency.take(), frequency, had_records, adds_records);
        self.delay_time =
            concat_metadata("delay_time", self.delay_time.take(), delay_time, had_records, adds_records);
        self.records.extend(records);
        merge_groups(&mut self.extra, extra);
    }
}

fn concat_metadata(
    name: &str,
    left: Option<Vec<f64>>,
    right: Option<Vec<f64>>,
    had_records: bool,
    adds_records: bool,
) -> Option<Vec<f64>> {
    match (left, right) {
        (Some(mut a), Some(b)) => {
            a.extend(b);
            Some(a)
        }
        (Some(a), None) if !adds_records => Some(a),
        (None, Some(b)) if !had_records => Some(b),
        (None, None) => None,
        _ => {
            log::warn!("Dropping '{name}' metadata: only one of the merged record sets carries it.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: usize) -> FidRecord {
        let times: Vec<f64> = (0..n).map(|i| i as f64).collect();
        FidRecord::new(times, vec![1.0; n], vec![0.0; n]).unwrap()
    }

    #[test]
    fn mismatched_fid_arrays_are_rejected() {
        assert!(FidRecord::new(vec![0.0, 1.0], vec![1.0], vec![0.0, 0.0]).is_err());
    }

    #[test]
    fn metadata_length_must_match_record_count() {
        let set = RecordSet::new(vec![record(4), record(4)]);
        assert!(set.clone().with_field(vec![1.0]).is_err());
        assert!(set.with_field(vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn common_len_is_shortest_record() {
        let set = RecordSet::new(vec![record(8), record(5), record(6)]);
        assert_eq!(set.common_len(), 5);
        assert_eq!(RecordSet::default().common_len(), 0);
    }

    #[test]
    fn append_concatenates_records_and_metadata() {
        let mut a = RecordSet::new(vec![record(4)])
            .with_delay_time(vec![10.0])
            .unwrap()
            .with_field(vec![1.0])
            .unwrap();
        let b = RecordSet::new(vec![record(4), record(4)])
            .with_delay_time(vec![20.0, 30.0])
            .unwrap();
        a.append(b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.delay_time(), Some(&[10.0, 20.0, 30.0][..]));
        // Only one side had a field, so it cannot cover every record.
        assert_eq!(a.field(), None);
    }

    #[test]
    fn append_into_empty_set_keeps_metadata() {
        let mut a = RecordSet::default();
        let b = RecordSet::new(vec![record(3)]).with_frequency(vec![12.5]).unwrap();
        a.append(b);
        assert_eq!(a.frequency(), Some(&[12.5][..]));
    }

    #[test]
    fn groups_merge_recursively_and_mismatches_go_opaque() {
        let mut left = MetaValue::Group(BTreeMap::from([(
            "0".to_string(),
            MetaValue::Group(BTreeMap::from([("delay_time".to_string(), MetaValue::Numeric(vec![1.0]))])),
        )]));
        let right = MetaValue::Group(BTreeMap::from([(
            "0".to_string(),
            MetaValue::Group(BTreeMap::from([("delay_time".to_string(), MetaValue::Numeric(vec![2.0]))])),
        )]));
        left.merge(right);
        let inner = left.as_group().unwrap()["0"].as_group().unwrap();
        assert_eq!(inner["delay_time"].as_numeric(), Some(&[1.0, 2.0][..]));

        let mut mixed = MetaValue::Numeric(vec![1.0]);
        mixed.merge(MetaValue::Opaque(vec![serde_json::json!("x")]));
        assert_eq!(mixed, MetaValue::Opaque(vec![serde_json::json!(1.0), serde_json::json!("x")]));
    }
}
