use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use super::{CheckDefinition, CheckOutcome, SimpleCheck, StratifiedCheck};
use crate::datastore::{DataStore, Patient, fetch_typed};

/// Stratum used for patients without an administrative gender
pub const UNKNOWN_GENDER: &str = "unknown";

/// Living patients, overall or per observed gender value
#[derive(Debug, Clone)]
pub struct SurvivalRateCheck {
    definition: CheckDefinition,
}

impl Default for SurvivalRateCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SurvivalRateCheck {
    pub fn new() -> Self {
        Self {
            definition: CheckDefinition::new(1002, "Survival rate, stratified per gender value")
                .with_description("What is the survival rate for different gender values")
                .with_thresholds(70, 90)
                .with_epsilon(0.3),
        }
    }

    async fn patients(store: &dyn DataStore) -> Result<Vec<Patient>> {
        fetch_typed(store, "Patient").await
    }
}

fn gender_key(patient: &Patient) -> String {
    match patient.gender.as_deref().map(str::trim) {
        Some(gender) if !gender.is_empty() => gender.to_lowercase(),
        _ => UNKNOWN_GENDER.to_string(),
    }
}

#[async_trait]
impl SimpleCheck for SurvivalRateCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, store: &dyn DataStore) -> Result<CheckOutcome> {
        let alive = Self::patients(store)
            .await?
            .into_iter()
            .filter(|patient| !patient.is_deceased())
            .map(|patient| patient.id);
        Ok(CheckOutcome::from_patients(alive))
    }
}

#[async_trait]
impl StratifiedCheck for SurvivalRateCheck {
    async fn execute_with_stratification(
        &self,
        store: &dyn DataStore,
    ) -> Result<HashMap<String, CheckOutcome>> {
        let mut strata: HashMap<String, CheckOutcome> = HashMap::new();

        for patient in Self::patients(store).await? {
            // every observed gender is a stratum, even one with no survivors
            let outcome = strata.entry(gender_key(&patient)).or_default();
            if !patient.is_deceased() && outcome.patients.insert(patient.id) {
                outcome.count += 1;
            }
        }

        Ok(strata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::BundleStore;
    use serde_json::json;

    fn store() -> BundleStore {
        BundleStore::from_resources(vec![
            json!({"resourceType": "Patient", "id": "m1", "gender": "male"}),
            json!({"resourceType": "Patient", "id": "m2", "gender": "male", "deceasedBoolean": true}),
            json!({"resourceType": "Patient", "id": "f1", "gender": "female"}),
            json!({"resourceType": "Patient", "id": "f2", "gender": "Female"}),
            json!({"resourceType": "Patient", "id": "o1", "gender": "other", "deceasedDateTime": "2021-03-04"}),
            json!({"resourceType": "Patient", "id": "x1"}),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_simple_form_counts_living_patients() {
        let outcome = SurvivalRateCheck::new().execute(&store()).await.unwrap();
        assert_eq!(outcome.count, 4);
    }

    #[tokio::test]
    async fn test_strata_are_discovered_from_data() {
        let strata = SurvivalRateCheck::new()
            .execute_with_stratification(&store())
            .await
            .unwrap();

        assert_eq!(strata.len(), 4);
        assert_eq!(strata["male"].count, 1);
        assert_eq!(strata["female"].count, 2);
        assert_eq!(strata["other"].count, 0);
        assert_eq!(strata[UNKNOWN_GENDER].count, 1);
        assert!(strata["female"].patients.contains("f2"));
    }

    #[tokio::test]
    async fn test_empty_store_has_no_strata() {
        let strata = SurvivalRateCheck::new()
            .execute_with_stratification(&BundleStore::default())
            .await
            .unwrap();
        assert!(strata.is_empty());
    }
}
