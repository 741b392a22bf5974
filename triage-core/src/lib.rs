//! Kiểu dữ liệu lõi cho điểm nguy cơ, danh sách cảnh báo và metadata tải dữ liệu.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tổng điểm từ ngưỡng này trở lên được coi là nguy cơ cao.
pub const HIGH_RISK_THRESHOLD: u32 = 4;

/// Nhiệt độ (°F) từ ngưỡng này trở lên được coi là sốt.
pub const FEVER_THRESHOLD_F: f64 = 99.6;

/// Điểm huyết áp cùng cặp tâm thu/tâm trương đã chuẩn hóa.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BloodPressureScore {
    pub score: u32,
    pub valid: bool,
    pub systolic: Option<i64>,
    pub diastolic: Option<i64>,
}

impl BloodPressureScore {
    /// Kết quả cho dữ liệu không đọc được: luôn 0 điểm.
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Điểm nhiệt độ. `fever` được tính độc lập với `score`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TemperatureScore {
    pub score: u32,
    pub valid: bool,
    pub fever: bool,
    pub temp: Option<f64>,
}

impl TemperatureScore {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Điểm tuổi (tuổi đã cắt phần thập phân).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AgeScore {
    pub score: u32,
    pub valid: bool,
    pub age: Option<i64>,
}

impl AgeScore {
    pub fn invalid() -> Self {
        Self::default()
    }
}

/// Kết quả chấm điểm của một bệnh nhân trong một lượt xử lý.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRisk {
    pub patient_id: String,
    pub blood_pressure: BloodPressureScore,
    pub temperature: TemperatureScore,
    pub age: AgeScore,
    pub total: u32,
    pub data_quality_issue: bool,
    pub fever: bool,
    pub high_risk: bool,
}

impl PatientRisk {
    /// Gộp ba điểm thành phần và suy ra tổng điểm cùng các cờ cảnh báo.
    pub fn from_scores(
        patient_id: impl Into<String>,
        blood_pressure: BloodPressureScore,
        temperature: TemperatureScore,
        age: AgeScore,
    ) -> Self {
        let total = blood_pressure.score + temperature.score + age.score;
        let data_quality_issue = !blood_pressure.valid || !temperature.valid || !age.valid;
        Self {
            patient_id: patient_id.into(),
            blood_pressure,
            temperature,
            age,
            total,
            data_quality_issue,
            fever: temperature.valid && temperature.fever,
            high_risk: total >= HIGH_RISK_THRESHOLD,
        }
    }
}

/// Ba danh sách cảnh báo gửi lên máy chấm. Mỗi danh sách không trùng lặp và đã sắp xếp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlertLists {
    pub high_risk_patients: Vec<String>,
    pub fever_patients: Vec<String>,
    pub data_quality_issues: Vec<String>,
}

impl AlertLists {
    /// Phân loại theo ba điều kiện độc lập; một bệnh nhân có thể nằm trong nhiều danh sách.
    pub fn from_risks<'a, I>(risks: I) -> Self
    where
        I: IntoIterator<Item = &'a PatientRisk>,
    {
        let mut high_risk = BTreeSet::new();
        let mut fever = BTreeSet::new();
        let mut data_quality = BTreeSet::new();

        for risk in risks {
            if risk.high_risk {
                high_risk.insert(risk.patient_id.clone());
            }
            if risk.fever {
                fever.insert(risk.patient_id.clone());
            }
            if risk.data_quality_issue {
                data_quality.insert(risk.patient_id.clone());
            }
        }

        Self {
            high_risk_patients: high_risk.into_iter().collect(),
            fever_patients: fever.into_iter().collect(),
            data_quality_issues: data_quality.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.high_risk_patients.is_empty()
            && self.fever_patients.is_empty()
            && self.data_quality_issues.is_empty()
    }
}

/// Metadata của một lần tải toàn bộ các trang.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FetchMeta {
    /// Tổng số bản ghi máy chủ báo (lần đầu nhìn thấy).
    pub expected_total: Option<u64>,
    /// Tổng số trang máy chủ báo (lần đầu nhìn thấy).
    pub expected_pages: Option<u64>,
    /// Các trang vẫn rỗng sau khi thử lại, tăng dần.
    pub missing_pages: Vec<u64>,
    /// Số mã bệnh nhân khác nhau đã thu thập.
    pub collected: usize,
    pub complete: bool,
}

impl FetchMeta {
    /// Chặn việc nộp kết quả khi dữ liệu chưa đầy đủ.
    pub fn ensure_complete(&self) -> Result<(), TriageError> {
        if self.complete {
            return Ok(());
        }
        Err(TriageError::Incomplete {
            collected: self.collected,
            expected_total: self.expected_total,
            missing_pages: self.missing_pages.clone(),
        })
    }
}

/// Báo cáo tổng hợp cuối cùng.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssessmentReport {
    pub generated_at: DateTime<Utc>,
    pub meta: FetchMeta,
    pub patients: Vec<PatientRisk>,
    pub alerts: AlertLists,
}

impl AssessmentReport {
    /// Khởi tạo báo cáo: sắp xếp bệnh nhân theo mã và dựng danh sách cảnh báo.
    pub fn new(meta: FetchMeta, mut patients: Vec<PatientRisk>) -> Self {
        patients.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        let alerts = AlertLists::from_risks(&patients);
        Self {
            generated_at: Utc::now(),
            meta,
            patients,
            alerts,
        }
    }

    pub fn alerts(&self) -> &AlertLists {
        &self.alerts
    }
}

/// Lỗi chung của lõi chấm điểm.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Dữ liệu đầu vào thiếu thông tin tối thiểu")]
    MissingData,
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
    #[error(
        "Dữ liệu chưa đầy đủ: đã thu {collected} bệnh nhân, kỳ vọng {expected_total:?}, trang thiếu {missing_pages:?}"
    )]
    Incomplete {
        collected: usize,
        expected_total: Option<u64>,
        missing_pages: Vec<u64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(score: u32) -> BloodPressureScore {
        BloodPressureScore {
            score,
            valid: true,
            systolic: Some(120),
            diastolic: Some(70),
        }
    }

    fn temp(score: u32, value: f64) -> TemperatureScore {
        TemperatureScore {
            score,
            valid: true,
            fever: value >= FEVER_THRESHOLD_F,
            temp: Some(value),
        }
    }

    fn age(score: u32) -> AgeScore {
        AgeScore {
            score,
            valid: true,
            age: Some(50),
        }
    }

    #[test]
    fn total_of_four_is_high_risk() {
        let risk = PatientRisk::from_scores("P1", bp(2), temp(1, 99.8), age(1));
        assert_eq!(risk.total, 4);
        assert!(risk.high_risk);
        assert!(risk.fever);
        assert!(!risk.data_quality_issue);
    }

    #[test]
    fn total_of_three_is_not_high_risk() {
        let risk = PatientRisk::from_scores("P1", bp(2), temp(0, 98.6), age(1));
        assert_eq!(risk.total, 3);
        assert!(!risk.high_risk);
    }

    #[test]
    fn invalid_categories_flag_quality_without_inflating_total() {
        let risk = PatientRisk::from_scores(
            "P2",
            bp(3),
            TemperatureScore::invalid(),
            AgeScore::invalid(),
        );
        assert_eq!(risk.total, 3);
        assert!(!risk.high_risk);
        assert!(risk.data_quality_issue);
        assert!(!risk.fever);
    }

    #[test]
    fn alert_lists_are_sorted_and_deduplicated() {
        let risks = vec![
            PatientRisk::from_scores("P3", bp(3), temp(2, 101.2), age(2)),
            PatientRisk::from_scores("P1", BloodPressureScore::invalid(), temp(1, 99.6), age(1)),
            PatientRisk::from_scores("P3", bp(3), temp(2, 101.2), age(2)),
            PatientRisk::from_scores("P2", bp(0), temp(0, 97.0), age(1)),
        ];

        let lists = AlertLists::from_risks(&risks);
        assert_eq!(lists.high_risk_patients, vec!["P3"]);
        assert_eq!(lists.fever_patients, vec!["P1", "P3"]);
        assert_eq!(lists.data_quality_issues, vec!["P1"]);
    }

    #[test]
    fn alert_lists_serialize_to_submission_body() {
        let lists = AlertLists {
            high_risk_patients: vec!["DEMO001".into()],
            fever_patients: vec![],
            data_quality_issues: vec!["DEMO002".into()],
        };
        let value = serde_json::to_value(&lists).expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({
                "high_risk_patients": ["DEMO001"],
                "fever_patients": [],
                "data_quality_issues": ["DEMO002"],
            })
        );
    }

    #[test]
    fn report_orders_patients_by_identifier() {
        let report = AssessmentReport::new(
            FetchMeta::default(),
            vec![
                PatientRisk::from_scores("B", bp(0), temp(0, 98.0), age(1)),
                PatientRisk::from_scores("A", bp(0), temp(0, 98.0), age(1)),
            ],
        );
        let ids: Vec<_> = report.patients.iter().map(|p| p.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(report.alerts().is_empty());
    }

    #[test]
    fn incomplete_meta_blocks_submission() {
        let meta = FetchMeta {
            expected_total: Some(10),
            expected_pages: Some(1),
            missing_pages: vec![1],
            collected: 0,
            complete: false,
        };
        assert!(matches!(
            meta.ensure_complete(),
            Err(TriageError::Incomplete { collected: 0, .. })
        ));

        let done = FetchMeta {
            complete: true,
            ..meta
        };
        assert!(done.ensure_complete().is_ok());
    }
}
