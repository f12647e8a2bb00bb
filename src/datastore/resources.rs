//! Typed views over the FHIR resources the built-in checks read.
//!
//! Only the fields the checks use are modelled; everything else in the source
//! JSON is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,

    #[serde(default)]
    pub gender: Option<String>,

    #[serde(default)]
    pub deceased_boolean: Option<bool>,

    #[serde(default)]
    pub deceased_date_time: Option<String>,

    #[serde(default)]
    pub identifier: Vec<Identifier>,
}

impl Patient {
    pub fn is_deceased(&self) -> bool {
        self.deceased_boolean.unwrap_or(false) || self.deceased_date_time.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default)]
    pub system: Option<String>,

    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub code: Option<CodeableConcept>,

    #[serde(default)]
    pub subject: Option<Reference>,
}

impl Condition {
    pub fn codings(&self) -> &[Coding] {
        self.code.as_ref().map(|c| c.coding.as_slice()).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default)]
    pub system: Option<String>,

    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub reference: Option<String>,
}

/// Last path segment of a FHIR reference: `Patient/123` -> `123`
pub fn reference_id(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}
