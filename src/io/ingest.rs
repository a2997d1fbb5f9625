//! Record-set ingestion.
//!
//! Two sources produce a [`RecordSet`]:
//!
//! - a JSON point-group container, one `point<N>` object per record
//! - a vendor trace matrix (sequence × time) with its FID time axis
//!
//! Design goals:
//! - **Strict schema** for the trace arrays (bad points are skipped and reported)
//! - **Best-effort metadata**: anything not understood is kept as opaque values
//! - **One canonical delay field**, resolved here and nowhere else

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use num_complex::Complex64;
use serde_json::{Map, Value};

use crate::data::{FidRecord, MetaValue, RecordSet, merge_groups};
use crate::error::AppError;

/// Relaxation delays (μs) of the standard 22-step vendor sequence, longest first.
pub const VENDOR_DELAY_TABLE_US: [f64; 22] = [
    5_000_000.0,
    2_600_000.0,
    1_350_000.0,
    700_000.0,
    360_000.0,
    190_000.0,
    98_000.0,
    51_000.0,
    26_000.0,
    13_600.0,
    7_100.0,
    3_700.0,
    1_900.0,
    988.0,
    512.0,
    266.0,
    138.0,
    72.0,
    37.0,
    19.0,
    10.0,
    1.0,
];

const POINT_PREFIX: &str = "point";
const VENDOR_PREFIX: &str = "tnmr_";
const FIELD_KEY: &str = "ppms_mf";
const FREQUENCY_KEY: &str = "obs_freq";
const DELAY_KEY: &str = "delay_time";
const LEGACY_DELAY_KEY: &str = "relaxation_time";
const SEQUENCE_KEY: &str = "sequence";

/// Where the canonical delay times were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelaySource {
    DelayTime,
    RelaxationTime,
    SequenceDelayTime,
    SequenceRelaxationTime,
}

impl DelaySource {
    pub fn display_name(self) -> &'static str {
        match self {
            DelaySource::DelayTime => "delay_time",
            DelaySource::RelaxationTime => "relaxation_time",
            DelaySource::SequenceDelayTime => "sequence/0/delay_time",
            DelaySource::SequenceRelaxationTime => "sequence/0/relaxation_time",
        }
    }
}

/// A point-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct PointError {
    pub key: String,
    pub message: String,
}

/// Ingest output: record set plus what happened along the way.
#[derive(Debug, Clone)]
pub struct LoadedContainer {
    pub records: RecordSet,
    pub point_errors: Vec<PointError>,
    pub points_read: usize,
    pub delay_source: Option<DelaySource>,
}

/// Read a JSON point-group container from disk.
pub fn load_container(path: &Path) -> Result<LoadedContainer, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::input(format!("Failed to open container '{}': {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        AppError::input(format!("Container '{}' is not valid JSON: {e}", path.display()))
    })?;
    parse_container(&value)
}

/// Parse an already-decoded container.
pub fn parse_container(value: &Value) -> Result<LoadedContainer, AppError> {
    let top = value
        .as_object()
        .ok_or_else(|| AppError::input("Container root must be a JSON object."))?;

    // Points are ordered by their embedded index, not by key text.
    let mut points: Vec<(usize, &String, &Value)> = Vec::new();
    for (key, entry) in top {
        match point_index(key) {
            Some(idx) => points.push((idx, key, entry)),
            None if key == "size" => {}
            None => log::debug!("Ignoring non-point container entry '{key}'."),
        }
    }
    points.sort_by_key(|(idx, _, _)| *idx);

    let mut records = Vec::with_capacity(points.len());
    let mut extra: BTreeMap<String, MetaValue> = BTreeMap::new();
    let mut point_errors = Vec::new();

    for (_, key, entry) in &points {
        match parse_point(entry) {
            Ok((record, meta)) => {
                records.push(record);
                merge_groups(&mut extra, meta);
            }
            Err(message) => point_errors.push(PointError {
                key: (*key).clone(),
                message,
            }),
        }
    }

    if let Some(size) = top.get("size").and_then(Value::as_u64) {
        if size as usize != points.len() {
            log::warn!(
                "Container declares size {size} but holds {} point groups.",
                points.len()
            );
        }
    }
    for err in &point_errors {
        log::warn!("Skipping {}: {}", err.key, err.message);
    }
    if records.is_empty() {
        return Err(AppError::no_data("Container holds no usable point groups."));
    }

    let n = records.len();
    let field = take_per_record(&mut extra, FIELD_KEY, n);
    let frequency = take_per_record(&mut extra, FREQUENCY_KEY, n);
    let delay = resolve_delay_times(&mut extra, n);

    let mut set = RecordSet::new(records);
    if let Some(field) = field {
        set = set.with_field(field)?;
    }
    if let Some(frequency) = frequency {
        set = set.with_frequency(frequency)?;
    }
    let delay_source = match delay {
        Some((values, source)) => {
            set = set.with_delay_time(values)?;
            Some(source)
        }
        None => {
            log::warn!("No delay-time metadata found; relaxation fitting will be unavailable.");
            None
        }
    };
    let set = set.with_extra(extra);

    log::info!(
        "Loaded {} records from {} point groups ({} skipped).",
        set.len(),
        points.len(),
        point_errors.len()
    );

    Ok(LoadedContainer {
        records: set,
        point_errors,
        points_read: points.len(),
        delay_source,
    })
}

fn point_index(key: &str) -> Option<usize> {
    key.strip_prefix(POINT_PREFIX)?.parse().ok()
}

/// Split one point group into its trace and its remaining metadata.
fn parse_point(entry: &Value) -> Result<(FidRecord, BTreeMap<String, MetaValue>), String> {
    let object = entry
        .as_object()
        .ok_or_else(|| "point group is not an object".to_string())?;

    let mut reals = None;
    let mut imags = None;
    let mut times = None;
    let mut meta = BTreeMap::new();

    for (raw_key, value) in object {
        let key = canonical_key(raw_key);
        match key.as_str() {
            "reals" => reals = Some(numeric_array(value).ok_or("'reals' is not a numeric array")?),
            "imags" => imags = Some(numeric_array(value).ok_or("'imags' is not a numeric array")?),
            "times" => times = Some(numeric_array(value).ok_or("'times' is not a numeric array")?),
            _ => {
                let classified = classify(value);
                match meta.get_mut(&key) {
                    Some(existing) => MetaValue::merge(existing, classified),
                    None => {
                        meta.insert(key, classified);
                    }
                }
            }
        }
    }

    let record = FidRecord::new(
        times.ok_or("missing 'times'")?,
        reals.ok_or("missing 'reals'")?,
        imags.ok_or("missing 'imags'")?,
    )
    .map_err(|e| e.message().to_string())?;
    Ok((record, meta))
}

/// Strip the vendor prefix.
fn canonical_key(key: &str) -> String {
    key.strip_prefix(VENDOR_PREFIX).unwrap_or(key).to_string()
}

fn numeric_array(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Number(n) => n.as_f64().map(|x| vec![x]),
        Value::Array(items) => items.iter().map(Value::as_f64).collect(),
        _ => None,
    }
}

/// Numbers become numeric metadata, objects become groups, the rest is opaque.
fn classify(value: &Value) -> MetaValue {
    if let Some(numbers) = numeric_array(value) {
        return MetaValue::Numeric(numbers);
    }
    match value {
        Value::Object(map) => MetaValue::Group(
            map.iter()
                .map(|(k, v)| (canonical_key(k), classify(v)))
                .collect(),
        ),
        other => MetaValue::Opaque(vec![other.clone()]),
    }
}

fn take_per_record(extra: &mut BTreeMap<String, MetaValue>, key: &str, n: usize) -> Option<Vec<f64>> {
    let values = extra.get(key)?.as_numeric()?;
    if values.len() != n {
        log::warn!(
            "Metadata '{key}' has {} values for {n} records; keeping it as extra metadata only.",
            values.len()
        );
        return None;
    }
    let values = values.to_vec();
    extra.remove(key);
    Some(values)
}

/// Resolve the canonical per-record delay times.
///
/// Compatibility rule: `delay_time` beats the legacy `relaxation_time`, and a
/// top-level per-point value beats one nested under `sequence/0`. A candidate
/// only counts if it carries exactly one value per record. The winning
/// top-level key is removed from `extra`; a losing legacy key is dropped too so
/// only one delay field survives.
pub fn resolve_delay_times(
    extra: &mut BTreeMap<String, MetaValue>,
    n: usize,
) -> Option<(Vec<f64>, DelaySource)> {
    let fits = |v: &MetaValue| v.as_numeric().filter(|x| x.len() == n).map(<[f64]>::to_vec);

    let sequence = extra
        .get(SEQUENCE_KEY)
        .and_then(MetaValue::as_group)
        .and_then(|g| g.get("0"))
        .and_then(MetaValue::as_group);

    let resolved = extra
        .get(DELAY_KEY)
        .and_then(fits)
        .map(|v| (v, DelaySource::DelayTime))
        .or_else(|| {
            extra
                .get(LEGACY_DELAY_KEY)
                .and_then(fits)
                .map(|v| (v, DelaySource::RelaxationTime))
        })
        .or_else(|| {
            sequence
                .and_then(|g| g.get(DELAY_KEY))
                .and_then(fits)
                .map(|v| (v, DelaySource::SequenceDelayTime))
        })
        .or_else(|| {
            sequence
                .and_then(|g| g.get(LEGACY_DELAY_KEY))
                .and_then(fits)
                .map(|v| (v, DelaySource::SequenceRelaxationTime))
        })?;

    match resolved.1 {
        DelaySource::DelayTime => {
            extra.remove(DELAY_KEY);
            if extra.remove(LEGACY_DELAY_KEY).is_some() {
                log::debug!("Both delay keys present; '{DELAY_KEY}' wins.");
            }
        }
        DelaySource::RelaxationTime => {
            extra.remove(LEGACY_DELAY_KEY);
        }
        DelaySource::SequenceDelayTime | DelaySource::SequenceRelaxationTime => {}
    }
    log::debug!("Delay times resolved from '{}'.", resolved.1.display_name());
    Some(resolved)
}

/// Render a record set as a point-group container.
///
/// Numeric extra metadata with one value per record is written back per point;
/// other extra metadata cannot be split by record and is left out.
pub fn to_container_json(set: &RecordSet) -> Value {
    let n = set.len();
    let mut top = Map::new();
    top.insert("size".to_string(), Value::from(n));

    for (i, record) in set.records().iter().enumerate() {
        let mut point = Map::new();
        point.insert("times".to_string(), Value::from(record.times.clone()));
        point.insert("reals".to_string(), Value::from(record.reals.clone()));
        point.insert("imags".to_string(), Value::from(record.imags.clone()));
        if let Some(delay) = set.delay_time() {
            point.insert(DELAY_KEY.to_string(), Value::from(delay[i]));
        }
        if let Some(field) = set.field() {
            point.insert(FIELD_KEY.to_string(), Value::from(field[i]));
        }
        if let Some(freq) = set.frequency() {
            point.insert(FREQUENCY_KEY.to_string(), Value::from(freq[i]));
        }
        for (key, value) in set.extra() {
            if let Some(values) = value.as_numeric().filter(|v| v.len() == n) {
                point.insert(key.clone(), Value::from(values[i]));
            }
        }
        top.insert(format!("{POINT_PREFIX}{i}"), Value::Object(point));
    }

    let skipped = set
        .extra()
        .values()
        .filter(|v| v.as_numeric().is_none_or(|x| x.len() != n))
        .count();
    if skipped > 0 {
        log::debug!("{skipped} extra metadata entries are not per-record and were not written.");
    }
    Value::Object(top)
}

/// Build a record set from a vendor trace matrix.
///
/// `rows` holds one complex FID per sequence step; `fid_times_s` is the shared
/// time axis in seconds. When the matrix has exactly 22 rows the standard delay
/// table is attached. Field (`<number>Oe`) and frequency (`<number>MHz`) are
/// taken from `file_name` when present.
pub fn records_from_vendor_matrix(
    rows: &[Vec<Complex64>],
    fid_times_s: &[f64],
    file_name: Option<&str>,
) -> Result<RecordSet, AppError> {
    if rows.is_empty() {
        return Err(AppError::no_data("Vendor trace matrix has no rows."));
    }
    let times: Vec<f64> = fid_times_s.iter().map(|t| t * 1e6).collect();

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if row.len() != times.len() {
            return Err(AppError::input(format!(
                "Vendor row {i} has {} samples but the time axis has {}.",
                row.len(),
                times.len()
            )));
        }
        let reals = row.iter().map(|c| c.re).collect();
        let imags = row.iter().map(|c| c.im).collect();
        records.push(FidRecord::new(times.clone(), reals, imags)?);
    }

    let n = records.len();
    let mut set = RecordSet::new(records);
    if n == VENDOR_DELAY_TABLE_US.len() {
        set = set.with_delay_time(VENDOR_DELAY_TABLE_US.to_vec())?;
    } else {
        log::warn!(
            "Vendor matrix has {n} rows, not {}; delay times left unset.",
            VENDOR_DELAY_TABLE_US.len()
        );
    }

    if let Some(name) = file_name {
        if let Some(field) = parse_unit_value(name, "Oe") {
            set = set.with_field(vec![field; n])?;
        }
        if let Some(freq) = parse_unit_value(name, "MHz") {
            set = set.with_frequency(vec![freq; n])?;
        }
    }
    Ok(set)
}

/// Find `<number><unit>` in `text` and return the number.
///
/// The first occurrence of `unit` that is directly preceded by a parseable
/// number wins.
pub fn parse_unit_value(text: &str, unit: &str) -> Option<f64> {
    for (pos, _) in text.match_indices(unit) {
        let head = &text[..pos];
        let Some((start, _)) = head
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
            .last()
        else {
            continue;
        };
        if let Ok(value) = head[start..].parse::<f64>() {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(delay_key: &str, delay: f64, field: f64) -> Value {
        let mut p = json!({
            "times": [0.0, 1.0, 2.0],
            "reals": [1.0, 0.5, 0.25],
            "imags": [0.0, 0.0, 0.0],
            "tnmr_ppms_mf": field,
            "note": "operator text",
        });
        p[delay_key] = json!(delay);
        p
    }

    #[test]
    fn points_are_ordered_by_embedded_index() {
        let container = json!({
            "point10": point("delay_time", 30.0, 3.0),
            "point2": point("delay_time", 20.0, 2.0),
            "point1": point("delay_time", 10.0, 1.0),
        });
        let loaded = parse_container(&container).unwrap();
        assert_eq!(loaded.records.delay_time(), Some(&[10.0, 20.0, 30.0][..]));
        assert_eq!(loaded.records.field(), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(loaded.delay_source, Some(DelaySource::DelayTime));
        // Strings survive as opaque metadata.
        assert!(matches!(
            loaded.records.extra().get("note"),
            Some(MetaValue::Opaque(v)) if v.len() == 3
        ));
    }

    #[test]
    fn legacy_relaxation_time_is_accepted() {
        let container = json!({
            "point0": point("tnmr_relaxation_time", 5.0, 1.0),
            "point1": point("tnmr_relaxation_time", 6.0, 1.0),
        });
        let loaded = parse_container(&container).unwrap();
        assert_eq!(loaded.records.delay_time(), Some(&[5.0, 6.0][..]));
        assert_eq!(loaded.delay_source, Some(DelaySource::RelaxationTime));
        assert!(!loaded.records.extra().contains_key("relaxation_time"));
    }

    #[test]
    fn delay_time_beats_relaxation_time() {
        let mut a = point("delay_time", 1.0, 0.0);
        a["relaxation_time"] = json!(100.0);
        let mut b = point("delay_time", 2.0, 0.0);
        b["relaxation_time"] = json!(200.0);
        let loaded = parse_container(&json!({ "point0": a, "point1": b })).unwrap();
        assert_eq!(loaded.records.delay_time(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn sequence_group_is_the_last_resort() {
        let mut a = point("unused", 0.0, 0.0);
        a["sequence"] = json!({ "0": { "relaxation_time": 7.0 } });
        let mut b = point("unused", 0.0, 0.0);
        b["sequence"] = json!({ "0": { "relaxation_time": 8.0 } });
        let loaded = parse_container(&json!({ "point0": a, "point1": b })).unwrap();
        assert_eq!(loaded.records.delay_time(), Some(&[7.0, 8.0][..]));
        assert_eq!(loaded.delay_source, Some(DelaySource::SequenceRelaxationTime));
    }

    #[test]
    fn bad_points_are_skipped_and_reported() {
        let container = json!({
            "point0": point("delay_time", 1.0, 0.0),
            "point1": { "times": [0.0], "reals": ["x"], "imags": [0.0] },
        });
        let loaded = parse_container(&container).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.point_errors.len(), 1);
        assert_eq!(loaded.point_errors[0].key, "point1");
    }

    #[test]
    fn empty_container_is_no_data() {
        let err = parse_container(&json!({ "size": 0 })).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NO_DATA);
    }

    #[test]
    fn container_json_round_trips_canonical_fields() {
        let set = RecordSet::new(vec![
            FidRecord::new(vec![0.0, 1.0], vec![1.0, 2.0], vec![0.0, 0.5]).unwrap(),
            FidRecord::new(vec![0.0, 1.0], vec![3.0, 4.0], vec![0.1, 0.2]).unwrap(),
        ])
        .with_delay_time(vec![10.0, 20.0])
        .unwrap()
        .with_frequency(vec![12.0, 12.0])
        .unwrap();
        let loaded = parse_container(&to_container_json(&set)).unwrap();
        assert_eq!(loaded.records.records(), set.records());
        assert_eq!(loaded.records.delay_time(), set.delay_time());
        assert_eq!(loaded.records.frequency(), set.frequency());
    }

    #[test]
    fn vendor_matrix_gets_delay_table_and_name_metadata() {
        let rows = vec![vec![Complex64::new(1.0, 0.0); 4]; 22];
        let times = [0.0, 1e-6, 2e-6, 3e-6];
        let set = records_from_vendor_matrix(&rows, &times, Some("LiCoO2_9000Oe_117.3MHz.tnt")).unwrap();
        assert_eq!(set.delay_time(), Some(&VENDOR_DELAY_TABLE_US[..]));
        assert!((set.record(0).unwrap().times[3] - 3.0).abs() < 1e-9);
        assert_eq!(set.field().map(|f| f[0]), Some(9000.0));
        assert_eq!(set.frequency().map(|f| f[21]), Some(117.3));
    }

    #[test]
    fn vendor_matrix_of_other_length_has_no_delays() {
        let rows = vec![vec![Complex64::new(1.0, 0.0); 2]; 3];
        let set = records_from_vendor_matrix(&rows, &[0.0, 1e-6], None).unwrap();
        assert_eq!(set.delay_time(), None);
    }

    #[test]
    fn unit_values_parse_from_names() {
        assert_eq!(parse_unit_value("run_1500Oe.tnt", "Oe"), Some(1500.0));
        // Names carry no sign; a dash is a separator.
        assert_eq!(parse_unit_value("x_-2.5MHz", "MHz"), Some(2.5));
        assert_eq!(parse_unit_value("Oe_first_20Oe", "Oe"), Some(20.0));
        assert_eq!(parse_unit_value("nothing here", "Oe"), None);
    }
}
