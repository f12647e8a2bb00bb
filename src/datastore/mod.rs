//! Source clinical data store
//!
//! The engine only ever reads from the data store, through the narrow
//! [`DataStore`] trait: a population count and a per-type resource fetch.
//! Resources travel as FHIR JSON; checks deserialize the few fields they need
//! into the typed views in [`resources`].

pub mod bundle;
pub mod resources;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use bundle::BundleStore;
pub use resources::{CodeableConcept, Coding, Condition, Identifier, Patient, Reference};

/// Resource type whose count is the report's authoritative population size
pub const POPULATION_RESOURCE: &str = "Patient";

/// Read access to a FHIR-like clinical store.
///
/// Failures are ordinary errors. Inside a check they become an error-carrying
/// result; they never abort a report run.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Number of resources of the given type
    async fn count_resources(&self, resource_type: &str) -> Result<u64>;

    /// All resources of the given type as raw FHIR JSON
    async fn fetch_resources(&self, resource_type: &str) -> Result<Vec<serde_json::Value>>;
}

/// Fetch every resource of `resource_type` and deserialize it into `T`.
pub async fn fetch_typed<T: DeserializeOwned>(
    store: &dyn DataStore,
    resource_type: &str,
) -> Result<Vec<T>> {
    store
        .fetch_resources(resource_type)
        .await?
        .into_iter()
        .map(|value| {
            serde_json::from_value(value)
                .with_context(|| format!("Malformed {resource_type} resource"))
        })
        .collect()
}
