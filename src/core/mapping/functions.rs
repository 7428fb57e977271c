//! Named functions usable as column expressions

use crate::core::path::{PathEvaluator, PathExpr};
use crate::domain::Record;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Supported column functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionName {
    /// First argument path with a non-empty result
    Coalesce,
    /// Concatenate the first value of each argument path as text
    Concat,
    /// Join all values of one path with a separator
    Join,
    /// Number of values of one path
    Count,
    /// Whether one path has any value
    Exists,
    /// Logical id part of reference strings (`Patient/123` gives `123`)
    ReferenceId,
    /// Date part of date or dateTime strings
    Date,
}

impl FromStr for FunctionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coalesce" => Ok(Self::Coalesce),
            "concat" => Ok(Self::Concat),
            "join" => Ok(Self::Join),
            "count" => Ok(Self::Count),
            "exists" => Ok(Self::Exists),
            "reference_id" => Ok(Self::ReferenceId),
            "date" => Ok(Self::Date),
            other => Err(format!("unknown function '{other}'")),
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Coalesce => "coalesce",
            Self::Concat => "concat",
            Self::Join => "join",
            Self::Count => "count",
            Self::Exists => "exists",
            Self::ReferenceId => "reference_id",
            Self::Date => "date",
        };
        f.write_str(s)
    }
}

/// A validated function invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    name: FunctionName,
    paths: Vec<PathExpr>,
    separator: Option<String>,
}

impl FunctionCall {
    /// Validate arity and parse path arguments
    ///
    /// `join` takes a path and an optional separator (default `", "`); every other
    /// argument is a path expression.
    pub fn compile(name: &str, args: &[String]) -> Result<Self, String> {
        let name = FunctionName::from_str(name)?;
        let (path_args, separator) = match name {
            FunctionName::Join => match args {
                [path] => (std::slice::from_ref(path), None),
                [path, sep] => (std::slice::from_ref(path), Some(sep.clone())),
                _ => return Err(format!("{name}() takes a path and an optional separator")),
            },
            FunctionName::Coalesce | FunctionName::Concat => {
                if args.is_empty() {
                    return Err(format!("{name}() needs at least one argument"));
                }
                (args, None)
            }
            FunctionName::Count
            | FunctionName::Exists
            | FunctionName::ReferenceId
            | FunctionName::Date => {
                if args.len() != 1 {
                    return Err(format!("{name}() takes exactly one argument, got {}", args.len()));
                }
                (args, None)
            }
        };

        let paths = path_args
            .iter()
            .map(|a| PathExpr::parse(a).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            paths,
            separator,
        })
    }

    /// The function being called
    pub fn name(&self) -> FunctionName {
        self.name
    }

    /// Evaluate against a record
    pub fn evaluate(&self, record: &Record, evaluator: &PathEvaluator) -> Vec<Value> {
        let mut results = self.paths.iter().map(|p| evaluator.evaluate(record, p));

        match self.name {
            FunctionName::Coalesce => results.find(|v| !v.is_empty()).unwrap_or_default(),
            FunctionName::Concat => {
                let parts: Vec<Vec<Value>> = results.collect();
                if parts.iter().all(Vec::is_empty) {
                    return Vec::new();
                }
                let text: String = parts
                    .iter()
                    .map(|values| values.first().map(value_text).unwrap_or_default())
                    .collect();
                vec![Value::String(text)]
            }
            FunctionName::Join => {
                let values = results.next().unwrap_or_default();
                if values.is_empty() {
                    return Vec::new();
                }
                let sep = self.separator.as_deref().unwrap_or(", ");
                let joined = values.iter().map(value_text).collect::<Vec<_>>().join(sep);
                vec![Value::String(joined)]
            }
            FunctionName::Count => {
                vec![Value::from(results.next().map(|v| v.len()).unwrap_or(0))]
            }
            FunctionName::Exists => {
                vec![Value::Bool(results.next().is_some_and(|v| !v.is_empty()))]
            }
            FunctionName::ReferenceId => results
                .next()
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_str)
                .filter_map(reference_id)
                .map(Value::String)
                .collect(),
            FunctionName::Date => results
                .next()
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_str)
                .map(|s| Value::String(s.get(..10).unwrap_or(s).to_string()))
                .collect(),
        }
    }
}

/// Textual form of a value for templates and concatenation
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extract the logical id from a FHIR reference string
///
/// Handles `Type/id`, absolute URLs, `_history` suffixes and `urn:uuid:` forms.
pub fn reference_id(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }
    if let Some(rest) = reference.strip_prefix("urn:uuid:").or_else(|| reference.strip_prefix("urn:oid:")) {
        return Some(rest.to_string());
    }

    let parts: Vec<&str> = reference.split('/').filter(|p| !p.is_empty()).collect();
    let id = match parts.iter().position(|p| *p == "_history") {
        Some(pos) if pos >= 1 => parts[pos - 1],
        Some(_) => return None,
        None => parts.last()?,
    };
    Some(id.to_string())
}
