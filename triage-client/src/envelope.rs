//! Normalization of the inconsistent page envelopes the API serves.

use serde_json::Value;
use triage_vitals::{parse_loose_number, PatientRecord};

const META_KEYS: [&str; 2] = ["pagination", "meta"];
const TOTAL_KEYS: [&str; 3] = ["total", "totalCount", "total_count"];
const TOTAL_PAGES_KEYS: [&str; 2] = ["totalPages", "total_pages"];
const HAS_NEXT_KEYS: [&str; 2] = ["hasNext", "has_next"];

/// One page: its patient batch plus whatever pagination metadata came with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageEnvelope {
    pub patients: Vec<PatientRecord>,
    pub total: Option<u64>,
    pub total_pages: Option<u64>,
    pub has_next: Option<bool>,
}

impl PageEnvelope {
    pub fn from_body(body: &Value) -> Self {
        let patients = patient_array(body)
            .map(|items| items.iter().filter_map(Value::as_object).cloned().collect())
            .unwrap_or_default();

        let meta = META_KEYS
            .iter()
            .find_map(|key| body.get(*key).filter(|value| value.is_object()));
        let scopes = [meta, Some(body)];

        Self {
            patients,
            total: lookup(scopes, &TOTAL_KEYS).and_then(as_count),
            total_pages: lookup(scopes, &TOTAL_PAGES_KEYS).and_then(as_count),
            has_next: lookup(scopes, &HAS_NEXT_KEYS).and_then(as_flag),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}

// `data`, then `data.patients`, then `patients`.
fn patient_array(body: &Value) -> Option<&Vec<Value>> {
    body.get("data")
        .and_then(Value::as_array)
        .or_else(|| {
            body.get("data")
                .and_then(|data| data.get("patients"))
                .and_then(Value::as_array)
        })
        .or_else(|| body.get("patients").and_then(Value::as_array))
}

fn lookup<'a>(scopes: [Option<&'a Value>; 2], keys: &[&str]) -> Option<&'a Value> {
    scopes
        .into_iter()
        .flatten()
        .find_map(|scope| keys.iter().find_map(|key| scope.get(*key)))
}

fn as_count(value: &Value) -> Option<u64> {
    parse_loose_number(Some(value))
        .filter(|n| *n >= 0.0)
        .map(|n| n.trunc() as u64)
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
