//! Whole-dump scoring: saved fetch output or a bare record array.

use serde_json::Value;
use triage_core::{PatientRisk, TriageError};

use crate::record::PatientRecord;
use crate::scoring::score_record;

/// Score records from a JSON string: either a bare array of records or an
/// object carrying a `patients` array.
pub fn assess_records_str(records_json: &str) -> Result<Vec<PatientRisk>, TriageError> {
    let value: Value =
        serde_json::from_str(records_json).map_err(|err| TriageError::Parse(err.to_string()))?;
    assess_records_value(&value)
}

/// Score records from a `serde_json::Value`.
pub fn assess_records_value(value: &Value) -> Result<Vec<PatientRisk>, TriageError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(fields) => fields
            .get("patients")
            .and_then(Value::as_array)
            .ok_or(TriageError::MissingData)?,
        other => {
            return Err(TriageError::Parse(format!(
                "Expected an array or an object with patients, received {}",
                kind_name(other)
            )))
        }
    };

    let records: Vec<PatientRecord> = items
        .iter()
        .filter_map(Value::as_object)
        .cloned()
        .collect();

    Ok(assess_records(&records))
}

/// Score every usable record; records without an identifier are dropped.
pub fn assess_records(records: &[PatientRecord]) -> Vec<PatientRisk> {
    let mut dropped = 0usize;
    let risks: Vec<PatientRisk> = records
        .iter()
        .filter_map(|record| {
            let risk = score_record(record);
            if risk.is_none() {
                dropped += 1;
            }
            risk
        })
        .collect();

    if dropped > 0 {
        tracing::debug!(dropped, "skipped records without a patient identifier");
    }

    risks
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
