use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::DataStore;

/// In-memory data store backed by the entries of a FHIR `Bundle`.
///
/// Used by the CLI to evaluate an exported bundle, and by tests as a
/// deterministic store.
#[derive(Debug, Default, Clone)]
pub struct BundleStore {
    resources: HashMap<String, Vec<Value>>,
}

impl BundleStore {
    /// Build a store from loose resources; each must carry `resourceType`.
    pub fn from_resources(resources: impl IntoIterator<Item = Value>) -> Result<Self> {
        let mut store = Self::default();
        for resource in resources {
            let resource_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .context("Resource is missing resourceType")?
                .to_string();
            store.resources.entry(resource_type).or_default().push(resource);
        }
        Ok(store)
    }

    /// Parse a `Bundle` document and index its `entry[].resource` values.
    pub fn from_bundle(bundle: Value) -> Result<Self> {
        if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            bail!("Expected a FHIR Bundle document");
        }

        let entries = match bundle.get("entry") {
            Some(Value::Array(entries)) => entries.clone(),
            Some(_) => bail!("Bundle.entry must be an array"),
            None => Vec::new(),
        };

        let resources = entries
            .into_iter()
            .filter_map(|mut entry| entry.get_mut("resource").map(Value::take));
        Self::from_resources(resources)
    }

    /// Load a bundle from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
        let bundle: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse bundle: {}", path.display()))?;
        Self::from_bundle(bundle).with_context(|| format!("Invalid bundle: {}", path.display()))
    }
}

#[async_trait]
impl DataStore for BundleStore {
    async fn count_resources(&self, resource_type: &str) -> Result<u64> {
        Ok(self.resources.get(resource_type).map_or(0, Vec::len) as u64)
    }

    async fn fetch_resources(&self, resource_type: &str) -> Result<Vec<Value>> {
        Ok(self.resources.get(resource_type).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn sample_bundle() -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [
                {"resource": {"resourceType": "Patient", "id": "p1"}},
                {"resource": {"resourceType": "Patient", "id": "p2"}},
                {"resource": {"resourceType": "Condition", "id": "c1"}},
                {"fullUrl": "urn:uuid:no-resource"}
            ]
        })
    }

    #[tokio::test]
    async fn test_bundle_indexes_resources_by_type() {
        let store = BundleStore::from_bundle(sample_bundle()).unwrap();
        assert_eq!(store.count_resources("Patient").await.unwrap(), 2);
        assert_eq!(store.count_resources("Condition").await.unwrap(), 1);
        assert_eq!(store.count_resources("Observation").await.unwrap(), 0);
        assert!(store.fetch_resources("Specimen").await.unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_bundle_documents() {
        assert!(BundleStore::from_bundle(json!({"resourceType": "Patient"})).is_err());
        assert!(BundleStore::from_bundle(json!({"resourceType": "Bundle", "entry": {}})).is_err());
    }

    #[test]
    fn test_rejects_resources_without_type() {
        assert!(BundleStore::from_resources(vec![json!({"id": "x"})]).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bundle.json");
        fs::write(&path, sample_bundle().to_string()).unwrap();

        let store = BundleStore::load(&path).unwrap();
        assert_eq!(store.count_resources("Patient").await.unwrap(), 2);

        let missing = temp_dir.path().join("missing.json");
        let err = BundleStore::load(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read bundle"));
    }
}
