use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use super::{CheckDefinition, CheckOutcome, SimpleCheck};
use crate::datastore::{DataStore, Patient, fetch_typed};

pub const DEFAULT_IDENTIFIER_SYSTEM: &str = "https://fhir.bbmri.de/id/patient";

/// Patients that share an identifier value within one identifier system.
///
/// Every patient involved in a collision is counted, not just the extra ones.
#[derive(Debug, Clone)]
pub struct DuplicateIdentifierCheck {
    definition: CheckDefinition,
    identifier_system: String,
}

impl Default for DuplicateIdentifierCheck {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_SYSTEM)
    }
}

impl DuplicateIdentifierCheck {
    pub fn new(identifier_system: impl Into<String>) -> Self {
        Self {
            definition: CheckDefinition::new(1000, "Duplicate identifiers")
                .with_description("Duplicate patients")
                .with_thresholds(10, 20)
                .with_epsilon(0.2),
            identifier_system: identifier_system.into(),
        }
    }
}

#[async_trait]
impl SimpleCheck for DuplicateIdentifierCheck {
    fn definition(&self) -> &CheckDefinition {
        &self.definition
    }

    async fn execute(&self, store: &dyn DataStore) -> Result<CheckOutcome> {
        let patients: Vec<Patient> = fetch_typed(store, "Patient").await?;

        let mut by_value: HashMap<&str, Vec<&str>> = HashMap::new();
        for patient in &patients {
            for identifier in &patient.identifier {
                if identifier.system.as_deref() != Some(self.identifier_system.as_str()) {
                    continue;
                }
                match identifier.value.as_deref() {
                    Some(value) if !value.is_empty() => {
                        by_value.entry(value).or_default().push(&patient.id)
                    }
                    _ => {}
                }
            }
        }

        let duplicates = by_value
            .into_values()
            .filter(|ids| ids.len() > 1)
            .flatten()
            .map(str::to_string);
        let outcome = CheckOutcome::from_patients(duplicates);

        debug!(check = %self.definition.name, count = outcome.count, "Duplicate identifiers evaluated");
        Ok(outcome)
    }
}
