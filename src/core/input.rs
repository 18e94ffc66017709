// PftLens - core/input.rs
//
// Decoding of raw measurement documents into `RawInput`.
// Core layer: accepts strings and readers, never touches the filesystem.
//
// Two JSON shapes are accepted, and may be mixed key by key:
//   structured: { "FEV1": { "value": 1.9, "percent_predicted": 58 }, ... }
//   flat:       { "FEV1": 1.9, "FEV1_pred": 58, "FEV1_FVC": 55, ... }
// In the flat shape a value of exactly 0 means "not reported".
//
// No numeric validation happens here; `core::measurement` does that.

use crate::core::model::{Field, Parameter};
use crate::util::error::InputError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;

/// An unvalidated number as it arrived from the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    fn is_zero(&self) -> bool {
        match self {
            RawValue::Number(n) => *n == 0.0,
            RawValue::Text(s) => s.trim().parse::<f64>().map_or(false, |n| n == 0.0),
        }
    }
}

/// Unvalidated numbers for one parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEntry {
    pub value: Option<RawValue>,
    pub percent_predicted: Option<RawValue>,
}

impl RawEntry {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.percent_predicted.is_none()
    }

    fn set(&mut self, field: Field, value: RawValue) {
        match field {
            Field::Value => self.value = Some(value),
            Field::PercentPredicted => self.percent_predicted = Some(value),
        }
    }
}

/// Mapping from parameter to unvalidated numbers. Any subset may be absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawInput {
    entries: BTreeMap<Parameter, RawEntry>,

    /// Keys that did not name a known parameter.
    pub ignored_keys: Vec<String>,
}

impl RawInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, parameter: Parameter) -> Option<&RawEntry> {
        self.entries.get(&parameter).filter(|e| !e.is_empty())
    }

    pub fn insert(&mut self, parameter: Parameter, entry: RawEntry) {
        self.entries.insert(parameter, entry);
    }

    /// Builder: set both numbers of a parameter.
    pub fn with(
        mut self,
        parameter: Parameter,
        value: Option<f64>,
        percent_predicted: Option<f64>,
    ) -> Self {
        self.entries.insert(
            parameter,
            RawEntry {
                value: value.map(RawValue::Number),
                percent_predicted: percent_predicted.map(RawValue::Number),
            },
        );
        self
    }

    /// Builder: set only the % predicted of a parameter.
    pub fn with_percent(self, parameter: Parameter, percent_predicted: f64) -> Self {
        self.with(parameter, None, Some(percent_predicted))
    }

    /// Builder: set the reported FEV1/FVC ratio (%).
    pub fn with_ratio(self, ratio: f64) -> Self {
        self.with(Parameter::Fev1FvcRatio, Some(ratio), None)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(RawEntry::is_empty)
    }

    /// True when neither the ratio nor the FVC % predicted was supplied,
    /// which usually means an empty form or a failed extraction.
    pub fn looks_empty(&self) -> bool {
        let no_ratio = self
            .get(Parameter::Fev1FvcRatio)
            .map_or(true, |e| e.value.is_none() && e.percent_predicted.is_none());
        let no_fvc = self
            .get(Parameter::Fvc)
            .map_or(true, |e| e.percent_predicted.is_none());
        no_ratio && no_fvc
    }
}

// =============================================================================
// Key resolution
// =============================================================================

/// Resolve a flat-record key (`FEV1`, `FEV1_pred`, `DLCO %pred`, ...) to the
/// parameter and field it addresses.
pub fn resolve_flat_key(key: &str) -> Option<(Parameter, Field)> {
    let trimmed = key.trim();
    let lower = trimmed.to_ascii_lowercase();
    for suffix in ["_pred", " %pred", " % pred", "_percent_predicted", "%pred"] {
        if let Some(base) = lower.strip_suffix(suffix) {
            return Parameter::from_name(base).map(|p| (p, Field::PercentPredicted));
        }
    }
    Parameter::from_name(trimmed).map(|p| (p, Field::Value))
}

/// Resolve a key inside a structured entry object.
fn resolve_entry_field(key: &str) -> Option<Field> {
    match key.trim().to_ascii_lowercase().as_str() {
        "value" | "actual" | "observed" => Some(Field::Value),
        "percent_predicted" | "percentpredicted" | "pred" | "percent" | "pct_pred" => {
            Some(Field::PercentPredicted)
        }
        _ => None,
    }
}

// =============================================================================
// JSON decoding
// =============================================================================

/// Strip Markdown code fences around a JSON payload (```json ... ```).
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop an info string such as `json` on the opening fence line.
        body = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest.trim_start_matches("json"),
        };
        body = body.trim_end();
        if let Some(inner) = body.strip_suffix("```") {
            body = inner;
        }
    }
    body.trim()
}

/// Decode a JSON measurement document.
pub fn parse_json(text: &str) -> Result<RawInput, InputError> {
    let body = strip_code_fences(text);
    let document: Value = serde_json::from_str(body).map_err(|e| InputError::Json { source: e })?;

    let object = match document {
        Value::Object(map) => map,
        other => {
            return Err(InputError::NotAnObject {
                found: json_kind(&other),
            })
        }
    };

    let mut input = RawInput::new();
    for (key, value) in object {
        match value {
            Value::Object(fields) => {
                let Some(parameter) = Parameter::from_name(&key) else {
                    tracing::debug!(key = %key, "Ignoring unrecognised measurement key");
                    input.ignored_keys.push(key);
                    continue;
                };
                let entry = input.entries.entry(parameter).or_default();
                for (field_key, field_value) in fields {
                    match resolve_entry_field(&field_key) {
                        Some(field) => {
                            if let Some(raw) = raw_value(field_value) {
                                entry.set(field, raw);
                            }
                        }
                        None => {
                            tracing::debug!(
                                parameter = %parameter,
                                field = %field_key,
                                "Ignoring unrecognised entry field"
                            );
                        }
                    }
                }
            }
            scalar => {
                let Some((parameter, field)) = resolve_flat_key(&key) else {
                    tracing::debug!(key = %key, "Ignoring unrecognised measurement key");
                    input.ignored_keys.push(key);
                    continue;
                };
                if let Some(raw) = raw_value(scalar).filter(|r| !r.is_zero()) {
                    input.entries.entry(parameter).or_default().set(field, raw);
                }
            }
        }
    }

    tracing::debug!(
        parameters = input.entries.len(),
        ignored = input.ignored_keys.len(),
        "Decoded measurement document"
    );

    Ok(input)
}

/// Convert a JSON value to a raw number. `null` means absent; anything else
/// that is not a number is kept as text so validation can reject it.
fn raw_value(value: Value) -> Option<RawValue> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) => RawValue::Number(f),
            None => RawValue::Text(n.to_string()),
        }),
        Value::String(s) => Some(RawValue::Text(s)),
        other => Some(RawValue::Text(other.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// CSV batch decoding
// =============================================================================

/// One row of a batch file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRecord {
    /// Value of the `id` column, or `row-N` (1-based) when absent or empty.
    pub id: String,
    pub input: RawInput,
}

/// Decode a batch CSV. Columns use the flat-record names; an empty cell or
/// a 0 means "not reported". Stops at `max_rows`.
pub fn parse_csv<R: Read>(reader: R, max_rows: usize) -> Result<Vec<BatchRecord>, InputError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| InputError::Csv { row: 0, source: e })?
        .clone();

    let columns: Vec<Option<(Parameter, Field)>> =
        headers.iter().map(resolve_flat_key).collect();
    let id_column = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("id"));

    let ignored: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| columns[*i].is_none() && Some(*i) != id_column)
        .map(|(_, h)| h.to_string())
        .collect();
    if !ignored.is_empty() {
        tracing::debug!(columns = ?ignored, "Ignoring unrecognised CSV columns");
    }

    let mut records = Vec::new();
    for (index, row) in csv_reader.records().enumerate() {
        let row_number = index + 1;
        if records.len() >= max_rows {
            return Err(InputError::TooManyRows { max: max_rows });
        }
        let row = row.map_err(|e| InputError::Csv {
            row: row_number,
            source: e,
        })?;

        let mut input = RawInput::new();
        input.ignored_keys = ignored.clone();
        for (cell, column) in row.iter().zip(&columns) {
            let Some((parameter, field)) = column else {
                continue;
            };
            if cell.is_empty() {
                continue;
            }
            let raw = RawValue::Text(cell.to_string());
            if raw.is_zero() {
                continue;
            }
            input.entries.entry(*parameter).or_default().set(*field, raw);
        }

        let id = id_column
            .and_then(|i| row.get(i))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{row_number}"));

        records.push(BatchRecord { id, input });
    }

    tracing::debug!(rows = records.len(), "Decoded batch CSV");
    Ok(records)
}
