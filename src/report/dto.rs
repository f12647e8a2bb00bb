//! Export view of a report
//!
//! Only noised values leave the agent: raw counts and patient ids stay in the
//! stored [`Report`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Report, ReportId, ReportResult, ReportStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDto {
    pub id: ReportId,
    pub generated_at: DateTime<Utc>,
    pub status: ReportStatus,
    pub epsilon_budget: f64,
    pub number_of_entities: u64,
    pub results: Vec<ResultDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDto {
    pub check_id: u64,
    /// Check name, with the stratum appended for stratified results
    pub check_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stratum: Option<String>,
    pub obfuscated_value: Option<f64>,
    /// `obfuscated_value / number_of_entities`, 0 when either is missing
    pub ratio: f64,
    pub warning_threshold: u32,
    pub error_threshold: u32,
    pub epsilon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Report> for ReportDto {
    fn from(report: &Report) -> Self {
        let entities = report.number_of_entities.unwrap_or(0);
        Self {
            id: report.id,
            generated_at: report.generated_at,
            status: report.status,
            epsilon_budget: report.epsilon_budget,
            number_of_entities: entities,
            results: report
                .results
                .iter()
                .map(|result| ResultDto::new(result, entities))
                .collect(),
        }
    }
}

impl ResultDto {
    fn new(result: &ReportResult, entities: u64) -> Self {
        let ratio = match result.obfuscated_value {
            Some(value) if entities > 0 => value / entities as f64,
            _ => 0.0,
        };
        Self {
            check_id: result.check_id,
            check_name: result.display_name(),
            stratum: result.stratum.clone(),
            obfuscated_value: result.obfuscated_value,
            ratio,
            warning_threshold: result.warning_threshold,
            error_threshold: result.error_threshold,
            epsilon: result.epsilon,
            error: result.error.clone(),
        }
    }
}
