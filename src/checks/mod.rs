//! Data-quality checks
//!
//! A check is a named query against the [`DataStore`] that yields a raw count
//! and the patients behind it. Checks come in two capabilities:
//!
//! - [`SimpleCheck`]: one count for the whole population
//! - [`StratifiedCheck`]: one count per stratum, with strata discovered while
//!   the check runs
//!
//! Checks never add noise themselves. They return raw [`CheckOutcome`]s and
//! the [`CheckRunner`](crate::runner::CheckRunner) protects them, which keeps
//! check logic testable without mocking randomness.

pub mod duplicate_identifier;
pub mod icd;
pub mod invalid_condition;
pub mod survival_rate;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::AgentConfig;
use crate::datastore::DataStore;

pub use duplicate_identifier::DuplicateIdentifierCheck;
pub use invalid_condition::InvalidConditionIcdCheck;
pub use survival_rate::SurvivalRateCheck;

/// Static description and privacy policy of a check
#[derive(Debug, Clone, PartialEq)]
pub struct CheckDefinition {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub warning_threshold: u32,
    pub error_threshold: u32,
    /// Budget consumed by each result of this check
    pub epsilon: f64,
    /// Maximum change of the count when one patient is added or removed
    pub sensitivity: f64,
}

impl CheckDefinition {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            warning_threshold: 10,
            error_threshold: 30,
            epsilon: 1.0,
            sensitivity: 1.0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_thresholds(mut self, warning: u32, error: u32) -> Self {
        self.warning_threshold = warning;
        self.error_threshold = error;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }
}

/// Raw (pre-noise) outcome of a check or of one stratum
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub count: u64,
    pub patients: BTreeSet<String>,
}

impl CheckOutcome {
    pub fn new(count: u64, patients: BTreeSet<String>) -> Self {
        Self { count, patients }
    }

    /// Outcome whose count is the number of distinct patients
    pub fn from_patients(patients: impl IntoIterator<Item = String>) -> Self {
        let patients: BTreeSet<String> = patients.into_iter().collect();
        Self {
            count: patients.len() as u64,
            patients,
        }
    }
}

/// A check producing a single outcome
#[async_trait]
pub trait SimpleCheck: Send + Sync {
    fn definition(&self) -> &CheckDefinition;

    async fn execute(&self, store: &dyn DataStore) -> Result<CheckOutcome>;
}

/// A check producing one outcome per observed stratum key
#[async_trait]
pub trait StratifiedCheck: SimpleCheck {
    async fn execute_with_stratification(
        &self,
        store: &dyn DataStore,
    ) -> Result<HashMap<String, CheckOutcome>>;
}

/// A runnable check, tagged with its capability
#[derive(Clone)]
pub enum Check {
    Simple(Arc<dyn SimpleCheck>),
    Stratified(Arc<dyn StratifiedCheck>),
}

impl Check {
    pub fn simple(check: impl SimpleCheck + 'static) -> Self {
        Check::Simple(Arc::new(check))
    }

    pub fn stratified(check: impl StratifiedCheck + 'static) -> Self {
        Check::Stratified(Arc::new(check))
    }

    pub fn definition(&self) -> &CheckDefinition {
        match self {
            Check::Simple(check) => check.definition(),
            Check::Stratified(check) => check.definition(),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition().name
    }

    pub fn is_stratified(&self) -> bool {
        matches!(self, Check::Stratified(_))
    }
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name())
            .field("stratified", &self.is_stratified())
            .finish()
    }
}

/// The checks every report runs
pub fn builtin_checks(config: &AgentConfig) -> Vec<Check> {
    vec![
        Check::simple(DuplicateIdentifierCheck::new(
            config.datastore.identifier_system.clone(),
        )),
        Check::simple(InvalidConditionIcdCheck::new()),
        Check::stratified(SurvivalRateCheck::new()),
    ]
}
