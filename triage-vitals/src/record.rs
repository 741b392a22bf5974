//! Alias-tolerant access to loosely shaped patient records.

use serde_json::{Map, Value};

/// A patient record as served by the API: no fixed schema.
pub type PatientRecord = Map<String, Value>;

pub const IDENTIFIER_KEYS: [&str; 5] = ["patient_id", "patientId", "id", "patientID", "mrn"];
pub const BLOOD_PRESSURE_KEYS: [&str; 4] = ["blood_pressure", "bloodPressure", "bp", "BP"];
pub const TEMPERATURE_KEYS: [&str; 4] = [
    "temperature",
    "temp",
    "body_temperature",
    "temperature_f",
];
pub const AGE_KEYS: [&str; 4] = ["age", "patient_age", "age_years", "ageYears"];

/// Resolve the canonical identifier: the first alias holding a non-blank string.
pub fn patient_identifier(record: &PatientRecord) -> Option<String> {
    IDENTIFIER_KEYS.iter().find_map(|key| {
        record
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })
}

/// First value stored under any alias. A present `null` still counts as found.
pub fn raw_field<'a>(record: &'a PatientRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| record.get(*key))
}

/// Raw values feeding the three scored categories.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawVitals<'a> {
    pub blood_pressure: Option<&'a Value>,
    pub temperature: Option<&'a Value>,
    pub age: Option<&'a Value>,
}

impl<'a> RawVitals<'a> {
    pub fn from_record(record: &'a PatientRecord) -> Self {
        Self {
            blood_pressure: raw_field(record, &BLOOD_PRESSURE_KEYS),
            temperature: raw_field(record, &TEMPERATURE_KEYS),
            age: raw_field(record, &AGE_KEYS),
        }
    }
}
