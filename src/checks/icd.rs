//! Syntactic validation of ICD codes found in Condition codings

use regex::Regex;
use std::sync::LazyLock;

pub const ICD_10_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-10";
pub const ICD_10_CM_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-10-cm";
pub const ICD_9_CM_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-9-cm";

/// Chapter letter (U is reserved), a digit, a digit or `A`/`B`, then an
/// optional dotted subcategory.
static ICD_10_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-TV-Z][0-9][0-9AB](\.[0-9A-Z]{1,4})?$").expect("Failed to compile ICD-10 regex")
});

/// Numeric, V (supplementary) and E (external cause) codes
static ICD_9_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{3}(\.\d{1,2})?|V\d{2}(\.\d{1,2})?|E\d{3}(\.\d)?)$")
        .expect("Failed to compile ICD-9 regex")
});

/// Whether `system` is an ICD code system this validator understands
pub fn is_icd_system(system: &str) -> bool {
    matches!(system, ICD_10_SYSTEM | ICD_10_CM_SYSTEM | ICD_9_CM_SYSTEM)
}

/// Validate `code` against the grammar of `system`. Unknown systems are invalid.
pub fn is_valid_code(system: &str, code: &str) -> bool {
    let code = code.trim();
    match system {
        ICD_10_SYSTEM | ICD_10_CM_SYSTEM => ICD_10_REGEX.is_match(code),
        ICD_9_CM_SYSTEM => ICD_9_REGEX.is_match(code),
        _ => false,
    }
}
