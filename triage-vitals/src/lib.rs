//! Patient record JSON to `PatientRisk` scoring, tolerant of messy vitals.

pub mod assess;
pub mod blood_pressure;
pub mod record;
pub mod scoring;
pub mod values;

pub use assess::{assess_records, assess_records_str, assess_records_value};
pub use blood_pressure::{parse_blood_pressure, BloodPressureReading};
pub use record::{patient_identifier, raw_field, PatientRecord, RawVitals};
pub use scoring::{score_age, score_blood_pressure, score_record, score_temperature};
pub use values::parse_loose_number;
