//! Report and result data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::checks::{CheckDefinition, CheckOutcome};

/// Maximum stored length of a result error, in characters
pub const MAX_ERROR_LENGTH: usize = 255;

/// Suffix appended to errors cut down to [`MAX_ERROR_LENGTH`]
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Default total epsilon budget stamped on new reports
pub const DEFAULT_EPSILON_BUDGET: f64 = 2.0;

/// Opaque report identifier assigned by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub u64);

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ReportId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ReportId)
    }
}

/// Report generation status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Generating,
    Generated,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Generating => write!(f, "GENERATING"),
            ReportStatus::Generated => write!(f, "GENERATED"),
        }
    }
}

/// Parameters for a report about to be created
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReport {
    pub epsilon_budget: f64,
}

impl Default for NewReport {
    fn default() -> Self {
        Self {
            epsilon_budget: DEFAULT_EPSILON_BUDGET,
        }
    }
}

/// A data-quality report and the results gathered for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,

    /// Creation time, fixed at creation
    pub generated_at: DateTime<Utc>,

    pub status: ReportStatus,

    /// Total budget nominally available to the report. Informational only: the
    /// sum of per-result epsilons is not checked against it.
    pub epsilon_budget: f64,

    /// Authoritative population size, set once at finalization
    #[serde(default)]
    pub number_of_entities: Option<u64>,

    /// Results in arrival order
    #[serde(default)]
    pub results: Vec<ReportResult>,
}

impl Report {
    pub fn new(id: ReportId, draft: NewReport) -> Self {
        Self {
            id,
            generated_at: Utc::now(),
            status: ReportStatus::Generating,
            epsilon_budget: draft.epsilon_budget,
            number_of_entities: None,
            results: Vec::new(),
        }
    }

    pub fn is_generated(&self) -> bool {
        self.status == ReportStatus::Generated
    }

    /// Results that carry an error instead of a value
    pub fn failed_results(&self) -> impl Iterator<Item = &ReportResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    /// Append a result. Returns false once the report is generated.
    pub(crate) fn push_result(&mut self, result: ReportResult) -> bool {
        if self.is_generated() {
            return false;
        }
        self.results.push(result);
        true
    }

    /// GENERATING -> GENERATED. Returns false if already generated.
    pub(crate) fn mark_generated(&mut self, number_of_entities: u64) -> bool {
        if self.is_generated() {
            return false;
        }
        self.number_of_entities = Some(number_of_entities);
        self.status = ReportStatus::Generated;
        true
    }
}

/// The outcome of one (check, stratum) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult {
    pub check_name: String,
    pub check_id: u64,

    /// Pre-noise count. Kept for audit inside the report, never exported.
    pub raw_value: u64,

    /// Noised and possibly suppressed value; unset for failed checks
    #[serde(default)]
    pub obfuscated_value: Option<f64>,

    pub warning_threshold: u32,
    pub error_threshold: u32,

    /// Budget consumed by this result
    pub epsilon: f64,

    /// Bounded to [`MAX_ERROR_LENGTH`] characters
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub stratum: Option<String>,

    /// Patient ids in scope. Kept for audit, never exported.
    #[serde(default)]
    pub patients: BTreeSet<String>,
}

impl ReportResult {
    /// Raw result of a successful check, before noise is applied
    pub fn from_outcome(
        definition: &CheckDefinition,
        stratum: Option<String>,
        outcome: CheckOutcome,
    ) -> Self {
        Self {
            check_name: definition.name.clone(),
            check_id: definition.id,
            raw_value: outcome.count,
            obfuscated_value: None,
            warning_threshold: definition.warning_threshold,
            error_threshold: definition.error_threshold,
            epsilon: definition.epsilon,
            error: None,
            stratum,
            patients: outcome.patients,
        }
    }

    /// Result of a check that failed; raw value 0 and no patients
    pub fn failed(definition: &CheckDefinition, stratum: Option<String>, message: &str) -> Self {
        Self {
            check_name: definition.name.clone(),
            check_id: definition.id,
            raw_value: 0,
            obfuscated_value: None,
            warning_threshold: definition.warning_threshold,
            error_threshold: definition.error_threshold,
            epsilon: definition.epsilon,
            error: Some(truncate_error(message)),
            stratum,
            patients: BTreeSet::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// `name` or `name (stratum)`
    pub fn display_name(&self) -> String {
        match &self.stratum {
            Some(stratum) => format!("{} ({stratum})", self.check_name),
            None => self.check_name.clone(),
        }
    }
}

/// Bound an error message to [`MAX_ERROR_LENGTH`] characters.
///
/// Longer messages keep their head and end with [`TRUNCATION_MARKER`]; the
/// cut always falls on a character boundary.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LENGTH {
        return message.to_string();
    }
    let keep = MAX_ERROR_LENGTH - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
