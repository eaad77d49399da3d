//! Result normalization, merging, and summary statistics.
//!
//! # Normalization
//!
//! Backends return flat JSON records whose field names vary between the
//! relational store and the vector index (`platform_number` vs `float_id`,
//! `surface_temp` vs `surfacetemp`, ...). [`normalize_record`] maps any of
//! the known aliases onto a [`NormalizedRecord`]. Missing identifiers become
//! `""`, missing coordinates `0.0`, missing measurements `None`. Numbers may
//! arrive as JSON numbers or numeric strings. Nothing here fails: an entry
//! that is not a JSON object is skipped.
//!
//! | Field | Accepted keys |
//! |-------|---------------|
//! | `id` | `id` |
//! | `float_id` | `platform_number`, `float_id` |
//! | `cycle_number` | `cycle_number` |
//! | `location.latitude` | `latitude`, `lat` |
//! | `location.longitude` | `longitude`, `lon` |
//! | `timestamp` | `date`, `DATE`, `timestamp` |
//! | `temperature.surface` | `surface_temp`, `surfacetemp` |
//! | `temperature.thermocline_depth` | `thermocline_depth`, `thermoclinedepth` |
//! | `salinity.surface` | `surface_sal`, `surfacesal` |
//! | `salinity.min_depth` | `salinity_min_depth`, `salinitymindepth` |
//! | `salinity.max_depth` | `salinity_max_depth`, `salinitymaxdepth` |
//! | `stratification` | `mean_stratification`, `meanstratification`, `strat` |
//! | `mixed_layer_depth` | `mld` |
//! | `quality_flag` | `quality_flag`, `profile_temp_qc` |
//! | `data_mode` | `data_mode` |
//!
//! # Payload shapes
//!
//! | Tool | Records under | Extra |
//! |------|---------------|-------|
//! | `queryARGO` | `rows`, else `data` | – |
//! | `retrieveARGO` | `profiles` | parallel `similarities` array |
//! | `getARGOByLocation`, `getARGOByDateRange` | `profiles`, else `rows` | – |
//!
//! [`normalize_payload`] picks the right reader for a tool.
//!
//! # Merge
//!
//! [`merge`] keys records by `id` and keeps insertion order: structured
//! records first, then semantic records whose id was not seen. A semantic
//! record whose id is already present only contributes its
//! `similarity_score` and `context_note` (plus empty fields under
//! [`MergeOverlay::FillMissing`]). Records with an empty id are never
//! collapsed.

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::config::MergeOverlay;
use crate::models::{
    GeoBounds, Location, NormalizedRecord, ProfileVariables, Provenance, RecordMetadata,
    ResultSummary, SalinityVariables, TemperatureVariables, VariableRanges, VariableStats,
};
use crate::protocol::ToolKind;

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn number(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    field(obj, keys).and_then(as_number)
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    field(obj, keys).map(as_text).unwrap_or_default()
}

fn integer(obj: &Map<String, Value>, keys: &[&str]) -> i64 {
    match field(obj, keys) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Map one flat backend record onto the canonical shape.
///
/// See the module table for the accepted aliases. `similarity_score` and
/// `context_note` are left empty; only [`normalize_semantic`] sets them.
pub fn normalize_record(obj: &Map<String, Value>, source: Provenance) -> NormalizedRecord {
    NormalizedRecord {
        id: text(obj, &["id"]),
        float_id: text(obj, &["platform_number", "float_id"]),
        cycle_number: integer(obj, &["cycle_number"]),
        location: Location {
            latitude: number(obj, &["latitude", "lat"]).unwrap_or(0.0),
            longitude: number(obj, &["longitude", "lon"]).unwrap_or(0.0),
        },
        timestamp: text(obj, &["date", "DATE", "timestamp"]),
        variables: ProfileVariables {
            temperature: TemperatureVariables {
                surface: number(obj, &["surface_temp", "surfacetemp"]),
                thermocline_depth: number(obj, &["thermocline_depth", "thermoclinedepth"]),
            },
            salinity: SalinityVariables {
                surface: number(obj, &["surface_sal", "surfacesal"]),
                min_depth: number(obj, &["salinity_min_depth", "salinitymindepth"]),
                max_depth: number(obj, &["salinity_max_depth", "salinitymaxdepth"]),
            },
            stratification: number(
                obj,
                &["mean_stratification", "meanstratification", "strat"],
            ),
            mixed_layer_depth: number(obj, &["mld"]),
        },
        metadata: RecordMetadata {
            source,
            quality_flag: text(obj, &["quality_flag", "profile_temp_qc"]),
            data_mode: text(obj, &["data_mode"]),
        },
        similarity_score: None,
        context_note: None,
    }
}

fn records_at<'a>(data: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .filter_map(|k| data.get(*k).and_then(|v| v.as_array()))
        .next()
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// Structured-query payload: records under `rows`, falling back to `data`.
pub fn normalize_structured(data: &Value) -> Vec<NormalizedRecord> {
    records_at(data, &["rows", "data"])
        .iter()
        .filter_map(|r| r.as_object())
        .map(|obj| normalize_record(obj, Provenance::Structured))
        .collect()
}

/// Semantic-retrieval payload: `profiles` plus a parallel `similarities`
/// array. Scores missing from a short array are 0.0.
pub fn normalize_semantic(data: &Value) -> Vec<NormalizedRecord> {
    let similarities = records_at(data, &["similarities"]);

    records_at(data, &["profiles"])
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| raw.as_object().map(|obj| (i, obj)))
        .map(|(i, obj)| {
            let similarity = similarities
                .get(i)
                .and_then(as_number)
                .or_else(|| number(obj, &["similarity"]))
                .unwrap_or(0.0);

            let mut note = format!("Semantic similarity: {:.3}", similarity);
            if let Some(summary) = obj.get("summary").and_then(|s| s.as_str()) {
                if !summary.trim().is_empty() {
                    note.push_str("; ");
                    note.push_str(summary.trim());
                }
            }

            let mut record = normalize_record(obj, Provenance::Semantic);
            record.similarity_score = Some(similarity);
            record.context_note = Some(note);
            record
        })
        .collect()
}

/// Location and date-range payloads: records under `profiles`, falling back
/// to `rows`.
pub fn normalize_profiles(data: &Value, source: Provenance) -> Vec<NormalizedRecord> {
    records_at(data, &["profiles", "rows"])
        .iter()
        .filter_map(|r| r.as_object())
        .map(|obj| normalize_record(obj, source))
        .collect()
}

/// Normalize the `data` payload of a successful call to `kind`.
///
/// # Arguments
///
/// * `kind` — the tool that produced the payload; selects the reader.
/// * `data` — [`ToolResult::data`](crate::protocol::ToolResult::data) of a
///   successful result.
///
/// # Returns
///
/// Records in payload order. Location and date-range results come from the
/// profile database and are tagged [`Provenance::Structured`]. An
/// unrecognized payload yields an empty list.
pub fn normalize_payload(kind: ToolKind, data: &Value) -> Vec<NormalizedRecord> {
    match kind {
        ToolKind::StructuredQuery => normalize_structured(data),
        ToolKind::SemanticRetrieval => normalize_semantic(data),
        ToolKind::LocationSearch | ToolKind::DateRangeSearch => {
            normalize_profiles(data, Provenance::Structured)
        }
    }
}

/// Ordered, id-keyed record set.
///
/// Iteration order is first-insertion order. Records with an empty id are
/// kept but never indexed, so they are never replaced or overlaid.
#[derive(Debug, Default)]
pub struct RecordSet {
    records: Vec<NormalizedRecord>,
    index: HashMap<String, usize>,
}

impl RecordSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. A replaced record keeps its position.
    pub fn insert(&mut self, record: NormalizedRecord) {
        if record.id.is_empty() {
            self.records.push(record);
            return;
        }
        match self.index.get(&record.id) {
            Some(&pos) => self.records[pos] = record,
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Fold `record` into an existing entry with the same id, or append it.
    pub fn overlay(&mut self, record: NormalizedRecord, mode: MergeOverlay) {
        let found = if record.id.is_empty() {
            None
        } else {
            self.index.get(&record.id).copied()
        };
        let Some(pos) = found else {
            self.insert(record);
            return;
        };

        let existing = &mut self.records[pos];
        if record.similarity_score.is_some() {
            existing.similarity_score = record.similarity_score;
        }
        if record.context_note.is_some() {
            existing.context_note = record.context_note.clone();
        }
        if mode == MergeOverlay::FillMissing {
            fill_missing(existing, record);
        }
    }

    /// Number of records, including those with an empty id.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the set, yielding records in insertion order.
    pub fn into_records(self) -> Vec<NormalizedRecord> {
        self.records
    }
}

fn fill_missing(target: &mut NormalizedRecord, source: NormalizedRecord) {
    fn fill_str(t: &mut String, s: String) {
        if t.is_empty() {
            *t = s;
        }
    }
    fn fill_opt(t: &mut Option<f64>, s: Option<f64>) {
        if t.is_none() {
            *t = s;
        }
    }

    fill_str(&mut target.float_id, source.float_id);
    fill_str(&mut target.timestamp, source.timestamp);
    fill_str(&mut target.metadata.quality_flag, source.metadata.quality_flag);
    fill_str(&mut target.metadata.data_mode, source.metadata.data_mode);
    if target.cycle_number == 0 {
        target.cycle_number = source.cycle_number;
    }
    if target.location == Location::default() {
        target.location = source.location;
    }

    let (t, s) = (&mut target.variables, source.variables);
    fill_opt(&mut t.temperature.surface, s.temperature.surface);
    fill_opt(&mut t.temperature.thermocline_depth, s.temperature.thermocline_depth);
    fill_opt(&mut t.salinity.surface, s.salinity.surface);
    fill_opt(&mut t.salinity.min_depth, s.salinity.min_depth);
    fill_opt(&mut t.salinity.max_depth, s.salinity.max_depth);
    fill_opt(&mut t.stratification, s.stratification);
    fill_opt(&mut t.mixed_layer_depth, s.mixed_layer_depth);
}

/// Merge structured and semantic results for hybrid retrieval.
///
/// # Arguments
///
/// * `structured` — records from `queryARGO`, inserted first.
/// * `semantic` — records from `retrieveARGO`, overlaid by id.
/// * `mode` — what a semantic record may add to a structured one.
///
/// # Returns
///
/// One record per distinct non-empty id plus every empty-id record.
/// Structured values are never overwritten, and merging a list with itself
/// returns it unchanged.
pub fn merge(
    structured: Vec<NormalizedRecord>,
    semantic: Vec<NormalizedRecord>,
    mode: MergeOverlay,
) -> Vec<NormalizedRecord> {
    let mut set = RecordSet::new();
    for record in structured {
        set.insert(record);
    }
    for record in semantic {
        set.overlay(record, mode);
    }
    set.into_records()
}

fn stats(values: impl Iterator<Item = f64>) -> VariableStats {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    }
    if count == 0 {
        return VariableStats::default();
    }
    VariableStats {
        min: Some(min),
        max: Some(max),
        mean: Some(sum / count as f64),
    }
}

fn range(values: impl Iterator<Item = f64>) -> [f64; 2] {
    let s = stats(values);
    match (s.min, s.max) {
        (Some(min), Some(max)) => [min, max],
        _ => [0.0, 0.0],
    }
}

/// Count, geographic bounds and surface temperature / salinity statistics.
///
/// Bounds of an empty set are `[0, 0]`; statistics skip records where the
/// value is missing and are all `None` when no record has one.
pub fn summarize(records: &[NormalizedRecord]) -> ResultSummary {
    ResultSummary {
        total_profiles: records.len(),
        geographic_bounds: GeoBounds {
            lat_range: range(records.iter().map(|r| r.location.latitude)),
            lon_range: range(records.iter().map(|r| r.location.longitude)),
        },
        variable_ranges: VariableRanges {
            temperature: stats(records.iter().filter_map(|r| r.variables.temperature.surface)),
            salinity: stats(records.iter().filter_map(|r| r.variables.salinity.surface)),
        },
    }
}
