//! Generic structural checks for raw records

use super::ValidationResult;
use crate::domain::{Record, ResourceId, ResourceType};

/// Check the basic shape of a record
///
/// Every rule is evaluated. `FAIL` findings: the record is not an object, has no
/// string `resourceType`, has a `resourceType` other than `expected`, or has no
/// string `id`. `WARN` findings: the id is not FHIR-conformant, or
/// `meta.lastUpdated` is missing or unparsable.
pub fn validate_structural(record: &Record, expected: Option<&ResourceType>) -> Vec<ValidationResult> {
    let mut results = Vec::new();
    let subject = record.id();

    if !record.value().is_object() {
        results.push(ValidationResult::fail(
            "structural.object",
            "record is not a JSON object",
            subject,
        ));
    }

    match record.resource_type() {
        None => results.push(ValidationResult::fail(
            "structural.resource_type.present",
            "resourceType is missing or not a string",
            subject,
        )),
        Some(actual) => {
            if let Some(expected) = expected {
                if actual != expected.as_str() {
                    results.push(ValidationResult::fail(
                        "structural.resource_type.match",
                        format!("expected resourceType {expected}, found {actual}"),
                        subject,
                    ));
                }
            }
        }
    }

    match record.id() {
        None => results.push(ValidationResult::fail(
            "structural.id.present",
            "id is missing or not a string",
            None,
        )),
        Some(id) => match ResourceId::new(id) {
            Err(e) => results.push(ValidationResult::fail("structural.id.present", e, None)),
            Ok(id) if !id.is_fhir_conformant() => results.push(ValidationResult::warn(
                "structural.id.format",
                "id does not satisfy the FHIR id format",
                subject,
            )),
            Ok(_) => {}
        },
    }

    match (record.last_updated_raw(), record.last_updated()) {
        (None, _) => results.push(ValidationResult::warn(
            "structural.meta.last_updated",
            "meta.lastUpdated is missing; record cannot advance the watermark",
            subject,
        )),
        (Some(raw), None) => results.push(ValidationResult::warn(
            "structural.meta.last_updated",
            format!("meta.lastUpdated '{raw}' is not an RFC 3339 instant"),
            subject,
        )),
        _ => {}
    }

    results
}
