//! Domain identifier types with validation
//!
//! Newtype wrappers for FHIR identifiers. Each type ensures type safety and
//! validates format on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// FHIR resource type name newtype wrapper
///
/// The dispatch key for mapping and transformer selection. Must start with an
/// uppercase ASCII letter followed by ASCII letters or digits (e.g. `Observation`).
///
/// # Examples
///
/// ```
/// use strata::domain::ids::ResourceType;
/// use std::str::FromStr;
///
/// let rt = ResourceType::from_str("Observation").unwrap();
/// assert_eq!(rt.as_str(), "Observation");
/// assert!(ResourceType::from_str("observation").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a new ResourceType from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(ResourceType)` if the name is valid, `Err` otherwise
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        let mut chars = name.chars();
        match chars.next() {
            None => return Err("Resource type cannot be empty".to_string()),
            Some(c) if !c.is_ascii_uppercase() => {
                return Err(format!(
                    "Invalid resource type '{name}': must start with an uppercase letter"
                ))
            }
            Some(_) => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!(
                "Invalid resource type '{name}': only ASCII letters and digits are allowed"
            ));
        }
        Ok(Self(name))
    }

    /// Built-in names known to be valid
    pub(crate) fn from_static(name: &'static str) -> Self {
        debug_assert!(Self::new(name).is_ok());
        Self(name.to_string())
    }

    /// Returns the resource type as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.0
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// FHIR logical resource id newtype wrapper
///
/// Stable within one source system. FHIR restricts ids to 1-64 characters from
/// `[A-Za-z0-9\-\.]`; [`ResourceId::is_fhir_conformant`] reports that separately
/// so that non-conformant ids can be flagged without being rejected.
///
/// # Examples
///
/// ```
/// use strata::domain::ids::ResourceId;
///
/// let id = ResourceId::new("obs-42").unwrap();
/// assert!(id.is_fhir_conformant());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a new ResourceId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Resource id cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id satisfies the FHIR `id` datatype constraints
    pub fn is_fhir_conformant(&self) -> bool {
        self.0.len() <= 64
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_valid() {
        let rt = ResourceType::from_str("Observation").unwrap();
        assert_eq!(rt.as_str(), "Observation");
        assert_eq!(rt.to_string(), "Observation");
        assert!(ResourceType::new("MedicationRequest").is_ok());
    }

    #[test]
    fn test_resource_type_invalid() {
        assert!(ResourceType::new("").is_err());
        assert!(ResourceType::new("observation").is_err());
        assert!(ResourceType::new("Observation/1").is_err());
        assert!(ResourceType::new("Obs ervation").is_err());
    }

    #[test]
    fn test_resource_type_serde_validates() {
        let rt: ResourceType = serde_json::from_str("\"Patient\"").unwrap();
        assert_eq!(rt.as_str(), "Patient");
        assert!(serde_json::from_str::<ResourceType>("\"patient\"").is_err());
        assert_eq!(serde_json::to_string(&rt).unwrap(), "\"Patient\"");
    }

    #[test]
    fn test_resource_id() {
        let id = ResourceId::new("42").unwrap();
        assert_eq!(id.as_str(), "42");
        assert!(id.is_fhir_conformant());
        assert!(ResourceId::new("  ").is_err());
    }

    #[test]
    fn test_resource_id_conformance() {
        assert!(!ResourceId::new("has space").unwrap().is_fhir_conformant());
        assert!(!ResourceId::new("a".repeat(65)).unwrap().is_fhir_conformant());
        assert!(ResourceId::new("a.b-C9").unwrap().is_fhir_conformant());
    }
}
