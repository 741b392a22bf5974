//! Blood pressure readings in their several wire shapes.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::values::parse_loose_number;

const SYSTOLIC_KEYS: [&str; 3] = ["systolic", "sys", "s"];
const DIASTOLIC_KEYS: [&str; 3] = ["diastolic", "dia", "d"];

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern is valid"));

/// A systolic/diastolic pair. Never partially valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloodPressureReading {
    Valid { systolic: i64, diastolic: i64 },
    Invalid,
}

impl BloodPressureReading {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn systolic(&self) -> Option<i64> {
        match self {
            Self::Valid { systolic, .. } => Some(*systolic),
            Self::Invalid => None,
        }
    }

    pub fn diastolic(&self) -> Option<i64> {
        match self {
            Self::Valid { diastolic, .. } => Some(*diastolic),
            Self::Invalid => None,
        }
    }
}

/// Parse `"120/80"`, `[120, 80]` or `{"systolic": 120, "diastolic": 80}`.
pub fn parse_blood_pressure(value: Option<&Value>) -> BloodPressureReading {
    let Some(value) = value else {
        return BloodPressureReading::Invalid;
    };

    match value {
        Value::Null => BloodPressureReading::Invalid,
        Value::String(text) if text.is_empty() => BloodPressureReading::Invalid,
        Value::Array(items) => parse_pair(items),
        Value::Object(fields) if has_any_key(fields) => parse_keyed(fields),
        Value::Object(_) => BloodPressureReading::Invalid,
        other => parse_delimited(&coerce_to_text(other)),
    }
}

fn parse_pair(items: &[Value]) -> BloodPressureReading {
    parse_pair_values(items.first(), items.get(1))
}

fn has_any_key(fields: &Map<String, Value>) -> bool {
    SYSTOLIC_KEYS
        .iter()
        .chain(DIASTOLIC_KEYS.iter())
        .any(|key| fields.contains_key(*key))
}

// Once a systolic- or diastolic-like key is present the object is judged on its own;
// a missing partner never falls back to string parsing.
fn parse_keyed(fields: &Map<String, Value>) -> BloodPressureReading {
    let systolic = first_present(fields, &SYSTOLIC_KEYS);
    let diastolic = first_present(fields, &DIASTOLIC_KEYS);
    parse_pair_values(systolic, diastolic)
}

fn parse_pair_values(systolic: Option<&Value>, diastolic: Option<&Value>) -> BloodPressureReading {
    match (
        parse_loose_number(systolic).and_then(truncate),
        parse_loose_number(diastolic).and_then(truncate),
    ) {
        (Some(systolic), Some(diastolic)) => BloodPressureReading::Valid {
            systolic,
            diastolic,
        },
        _ => BloodPressureReading::Invalid,
    }
}

fn first_present<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| fields.get(*key).filter(|value| !value.is_null()))
}

fn parse_delimited(text: &str) -> BloodPressureReading {
    let parts: Vec<&str> = text.trim().split('/').map(str::trim).collect();
    let [systolic, diastolic] = parts.as_slice() else {
        return BloodPressureReading::Invalid;
    };
    if systolic.is_empty() || diastolic.is_empty() {
        return BloodPressureReading::Invalid;
    }

    match (leading_digits(systolic), leading_digits(diastolic)) {
        (Some(systolic), Some(diastolic)) => BloodPressureReading::Valid {
            systolic,
            diastolic,
        },
        _ => BloodPressureReading::Invalid,
    }
}

fn leading_digits(part: &str) -> Option<i64> {
    DIGIT_RUN
        .find(part)
        .and_then(|found| found.as_str().parse::<i64>().ok())
}

fn truncate(value: f64) -> Option<i64> {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated.abs() < i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

fn coerce_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
