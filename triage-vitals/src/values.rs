//! Loose numeric extraction from arbitrary JSON values.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Extract a number from a JSON number or from the first numeric run inside a string
/// (`"98.6F"` yields `98.6`). Anything else, including absent values, yields `None`.
pub fn parse_loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64().filter(|n| n.is_finite()),
        Value::String(text) => parse_number_in_text(text),
        _ => None,
    }
}

pub(crate) fn parse_number_in_text(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    NUMBER_PATTERN
        .find(trimmed)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}
