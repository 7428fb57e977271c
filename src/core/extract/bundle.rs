//! FHIR search-set Bundle parsing

use crate::domain::{ExtractError, Record};
use serde_json::Value;

/// Records and paging links of one search-set Bundle
#[derive(Debug, Clone, Default)]
pub struct SearchBundle {
    /// Matched resources in server order
    pub records: Vec<Record>,
    /// `link[relation=next].url`, if the server has more pages
    pub next: Option<String>,
    /// `Bundle.total`, when the server reports it
    pub total: Option<u64>,
}

/// Parse a search response body
///
/// Entries whose `search.mode` is `include` or `outcome` are skipped; entries
/// without a `resource` are ignored.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidResponse`] if the body is not a Bundle.
pub fn parse_bundle(body: Value) -> Result<SearchBundle, ExtractError> {
    let Value::Object(mut bundle) = body else {
        return Err(ExtractError::InvalidResponse(
            "search response is not a JSON object".to_string(),
        ));
    };

    let resource_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .map(str::to_string);
    match resource_type.as_deref() {
        Some("Bundle") => {}
        Some("OperationOutcome") => {
            return Err(ExtractError::InvalidResponse(format!(
                "server returned OperationOutcome: {}",
                outcome_summary(&Value::Object(bundle))
            )))
        }
        other => {
            return Err(ExtractError::InvalidResponse(format!(
                "expected a Bundle, got resourceType {other:?}"
            )))
        }
    }

    let next = bundle
        .get("link")
        .and_then(Value::as_array)
        .and_then(|links| {
            links.iter().find(|link| link.get("relation").and_then(Value::as_str) == Some("next"))
        })
        .and_then(|link| link.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    let total = bundle.get("total").and_then(Value::as_u64);

    let records = match bundle.remove("entry") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter(|entry| {
                !matches!(
                    entry.pointer("/search/mode").and_then(Value::as_str),
                    Some("include") | Some("outcome")
                )
            })
            .filter_map(|mut entry| entry.get_mut("resource").map(Value::take))
            .map(Record::new)
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(ExtractError::InvalidResponse(
                "Bundle.entry is not an array".to_string(),
            ))
        }
    };

    Ok(SearchBundle { records, next, total })
}

fn outcome_summary(outcome: &Value) -> String {
    outcome
        .get("issue")
        .and_then(Value::as_array)
        .map(|issues| {
            issues
                .iter()
                .filter_map(|issue| {
                    issue
                        .get("diagnostics")
                        .or_else(|| issue.pointer("/details/text"))
                        .and_then(Value::as_str)
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}
