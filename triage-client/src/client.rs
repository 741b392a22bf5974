//! The patient API: paged reads and assessment submission.

use reqwest::Method;
use serde_json::{json, Value};
use triage_core::AlertLists;

use crate::pagination::{self, FetchOptions, FetchResult, PageSource};
use crate::transport::{Transport, TransportConfig, TransportError};

const PATIENTS_PATH: &str = "patients";
const SUBMIT_PATH: &str = "submit-assessment";

#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            transport: Transport::new(base_url, api_key, config)?,
        })
    }

    /// Fetch and reconcile every page.
    pub async fn fetch_all(&self, options: FetchOptions) -> Result<FetchResult, TransportError> {
        pagination::fetch_all(self, options).await
    }

    /// POST the three alert lists and return whatever the grader answered.
    pub async fn submit_assessment(&self, alerts: &AlertLists) -> Result<Value, TransportError> {
        let body = json!({
            "high_risk_patients": alerts.high_risk_patients,
            "fever_patients": alerts.fever_patients,
            "data_quality_issues": alerts.data_quality_issues,
        });
        tracing::info!(
            high_risk = alerts.high_risk_patients.len(),
            fever = alerts.fever_patients.len(),
            data_quality = alerts.data_quality_issues.len(),
            "submitting assessment"
        );

        let response = self
            .transport
            .request(Method::POST, SUBMIT_PATH, &[], Some(&body))
            .await?;
        Ok(response.body.into_json())
    }
}

impl PageSource for ApiClient {
    async fn fetch_page(&self, page: u64, limit: u32) -> Result<Value, TransportError> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        let response = self
            .transport
            .request(Method::GET, PATIENTS_PATH, &query, None)
            .await?;
        Ok(response.body.into_json())
    }
}
