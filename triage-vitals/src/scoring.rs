//! Fixed point table for blood pressure, temperature and age.

use serde_json::Value;
use triage_core::{AgeScore, BloodPressureScore, PatientRisk, TemperatureScore, FEVER_THRESHOLD_F};

use crate::blood_pressure::{parse_blood_pressure, BloodPressureReading};
use crate::record::{patient_identifier, PatientRecord, RawVitals};
use crate::values::parse_loose_number;

/// Score a parsed reading. Stage 2 is checked before stage 1 so disagreeing
/// components resolve to the higher stage.
pub fn score_blood_pressure(reading: BloodPressureReading) -> BloodPressureScore {
    let BloodPressureReading::Valid {
        systolic: s,
        diastolic: d,
    } = reading
    else {
        return BloodPressureScore::invalid();
    };

    let score = match (s, d) {
        (s, d) if s < 120 && d < 80 => 0,
        (120..=129, d) if d < 80 => 1,
        (s, d) if s >= 140 || d >= 90 => 3,
        (130..=139, _) | (_, 80..=89) => 2,
        _ => return BloodPressureScore::invalid(),
    };

    BloodPressureScore {
        score,
        valid: true,
        systolic: Some(s),
        diastolic: Some(d),
    }
}

pub fn score_blood_pressure_value(value: Option<&Value>) -> BloodPressureScore {
    score_blood_pressure(parse_blood_pressure(value))
}

pub fn score_temperature(value: Option<&Value>) -> TemperatureScore {
    let Some(t) = parse_loose_number(value) else {
        return TemperatureScore::invalid();
    };

    let fever = t >= FEVER_THRESHOLD_F;
    let score = if t >= 101.0 {
        2
    } else if fever {
        1
    } else {
        0
    };

    TemperatureScore {
        score,
        valid: true,
        fever,
        temp: Some(t),
    }
}

/// Under 40 and 40-65 carry the same weight; only over 65 scores higher.
pub fn score_age(value: Option<&Value>) -> AgeScore {
    let Some(age) = parse_loose_number(value).map(f64::trunc) else {
        return AgeScore::invalid();
    };
    let age = age as i64;

    AgeScore {
        score: if age > 65 { 2 } else { 1 },
        valid: true,
        age: Some(age),
    }
}

/// Score one record. `None` means the record has no usable identifier.
pub fn score_record(record: &PatientRecord) -> Option<PatientRisk> {
    let patient_id = patient_identifier(record)?;
    let vitals = RawVitals::from_record(record);

    Some(PatientRisk::from_scores(
        patient_id,
        score_blood_pressure_value(vitals.blood_pressure),
        score_temperature(vitals.temperature),
        score_age(vitals.age),
    ))
}
