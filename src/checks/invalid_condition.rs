use anyhow::Result;
use async_trait::async_trait;

use super::icd::{is_icd_system, is_valid_code};
use super::{CheckDefinition, CheckOutcome, SimpleCheck};
use crate::datastore::resources::reference_id;
use crate::datastore::{Condition, DataStore, fetch_typed};

/// Patients with an ICD-coded Condition whose ICD codes are all malformed.
///
/// Conditions coded only in non-ICD systems are out of scope for this check.
#[derive(Debug, Clone)]
pub struct InvalidConditionIcdCheck {
    definition: CheckDefinition,
}

impl Default for InvalidConditionIcdCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidConditionIcdCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition::new(1001, "Invalid ICD-10 Codes")
                .with_description("How many conditions have invalid ICD-10 codes")
                .with_thresholds(10, 30)
                .with_epsilon(0.2),
        }
    }
}

fn has_only_invalid_icd_codes(condition: &Condition) -> bool {
    let mut icd_codings = condition
        .codings()
        .iter()
        .filter(|coding| coding.system.as_deref().is_some_and(is_icd_system))
        .peekable();

    if icd_codings.peek().is_none() {
        return false;
    }

    !icd_codings.any(|coding| match (coding.system.as_deref(), coding.code.as_deref()) {
        (Some(system), Some(code)) => is_valid_code(system, code),
        _ => false,
    })
}

#[async_trait]
impl SimpleCheck for InvalidConditionIcdCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, store: &dyn DataStore) -> Result<CheckOutcome> {
        let conditions: Vec<Condition> = fetch_typed(store, "Condition").await?;

        let patients = conditions
            .iter()
            .filter(|condition| has_only_invalid_icd_codes(condition))
            .filter_map(|condition| condition.subject.as_ref()?.reference.as_deref())
            .filter(|reference| !reference.is_empty())
            .map(|reference| reference_id(reference).to_string());

        Ok(CheckOutcome::from_patients(patients))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::icd::{ICD_9_CM_SYSTEM, ICD_10_SYSTEM};
    use crate::datastore::BundleStore;
    use serde_json::{Value, json};

    fn condition(subject: &str, codings: Value) -> Value {
        json!({
            "resourceType": "Condition",
            "code": {"coding": codings},
            "subject": {"reference": format!("Patient/{subject}")}
        })
    }

    #[tokio::test]
    async fn test_flags_patients_with_only_invalid_codes() {
        let store = BundleStore::from_resources(vec![
            condition("p1", json!([{"system": ICD_10_SYSTEM, "code": "C50.9"}])),
            condition("p2", json!([{"system": ICD_10_SYSTEM, "code": "NOT-A-CODE"}])),
            condition(
                "p3",
                json!([
                    {"system": ICD_10_SYSTEM, "code": "XX"},
                    {"system": ICD_9_CM_SYSTEM, "code": "250.00"}
                ]),
            ),
            condition("p4", json!([{"system": "http://snomed.info/sct", "code": "254837009"}])),
            condition("p2", json!([{"system": ICD_10_SYSTEM, "code": "???"}])),
        ])
        .unwrap();

        let outcome = InvalidConditionIcdCheck::new().execute(&store).await.unwrap();
        assert_eq!(outcome.count, 1);
        assert!(outcome.patients.contains("p2"));
    }

    #[tokio::test]
    async fn test_no_conditions_yields_zero() {
        let store = BundleStore::default();
        let outcome = InvalidConditionIcdCheck::new().execute(&store).await.unwrap();
        assert_eq!(outcome.count, 0);
    }
}
