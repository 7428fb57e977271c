//! Mapping specification documents
//!
//! A mapping specification is a versioned, declarative description of how one
//! resource type is flattened into rows:
//!
//! ```toml
//! resource_type = "Observation"
//! version = 1
//! standardize = ["status"]
//!
//! [[columns]]
//! name = "id"
//! path = "id"
//!
//! [[columns]]
//! name = "code"
//! path = "code.coding.first().code"
//!
//! [[columns]]
//! name = "subject_id"
//! function = "reference_id"
//! args = ["subject.reference"]
//! required = true
//!
//! [[rules]]
//! id = "status-allowed"
//! field = "status"
//! constraint = "allowed"
//! values = ["final", "amended"]
//! ```
//!
//! `columns` may also be a table keyed by column name, in document order:
//!
//! ```toml
//! [columns]
//! id = "id"
//! code = "code.coding.first().code"
//! subject_id = { function = "reference_id", args = ["subject.reference"], required = true }
//! ```
//!
//! Documents are validated completely when parsed; a spec that parses is safe to
//! evaluate against any record.

use super::functions::{value_text, FunctionCall, FunctionName};
use crate::core::path::{PathEvaluator, PathExpr};
use crate::core::validation::{BusinessRule, RuleSpec};
use crate::domain::schema::RESERVED_COLUMNS;
use crate::domain::{ColumnDef, DataType, Record, ResourceType, Result, StrataError, TableSchema};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Raw mapping document as written on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingDocument {
    /// Resource type this spec maps
    pub resource_type: String,
    /// Monotonic spec version
    pub version: Option<u32>,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered output columns
    #[serde(default, deserialize_with = "deserialize_columns")]
    pub columns: Vec<ColumnDocument>,
    /// Business rules over mapped rows
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Columns normalized by the `standardize_codes` post-hook
    #[serde(default)]
    pub standardize: Vec<String>,
}

/// Raw column declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDocument {
    /// Output column name
    pub name: String,
    /// Path expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Constant value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<Value>,
    /// Text with `{path}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Function arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Declared leaf type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    /// Keep every value as a list
    #[serde(default)]
    pub multiple: bool,
    /// An empty result fails the record
    #[serde(default)]
    pub required: bool,
}

/// `columns` as an array of column tables, or as a table keyed by column
/// name whose values are a path string or a column table without `name`.
/// Both forms keep document order.
fn deserialize_columns<'de, D>(deserializer: D) -> std::result::Result<Vec<ColumnDocument>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ColumnsVisitor;

    impl<'de> Visitor<'de> for ColumnsVisitor {
        type Value = Vec<ColumnDocument>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of columns or a table of column names")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
            let mut columns = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(column) = seq.next_element()? {
                columns.push(column);
            }
            Ok(columns)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut columns = Vec::new();
            while let Some(name) = map.next_key::<String>()? {
                let column = match map.next_value::<Value>()? {
                    Value::String(path) => ColumnDocument {
                        name,
                        path: Some(path),
                        ..ColumnDocument::default()
                    },
                    Value::Object(mut body) => {
                        if body.contains_key("name") {
                            return Err(de::Error::custom(format!(
                                "column '{name}' is keyed by name and must not repeat `name`"
                            )));
                        }
                        body.insert("name".to_string(), Value::String(name.clone()));
                        serde_json::from_value(Value::Object(body))
                            .map_err(|e| de::Error::custom(format!("column '{name}': {e}")))?
                    }
                    other => {
                        return Err(de::Error::custom(format!(
                            "column '{name}' must be a path string or a table, found {other}"
                        )))
                    }
                };
                columns.push(column);
            }
            Ok(columns)
        }
    }

    deserializer.deserialize_any(ColumnsVisitor)
}

/// A compiled column expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Path into the record
    Path(PathExpr),
    /// Constant value
    Literal(Value),
    /// Text template
    Template(Template),
    /// Named function
    Function(FunctionCall),
}

impl Expression {
    /// Evaluate against a record
    pub fn evaluate(&self, record: &Record, evaluator: &PathEvaluator) -> Vec<Value> {
        match self {
            Expression::Path(expr) => evaluator.evaluate(record, expr),
            Expression::Literal(Value::Null) => Vec::new(),
            Expression::Literal(value) => vec![value.clone()],
            Expression::Template(template) => vec![Value::String(template.render(record, evaluator))],
            Expression::Function(call) => call.evaluate(record, evaluator),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TemplatePart {
    Text(String),
    Path(PathExpr),
}

/// Text with `{path}` placeholders; `{{` and `}}` escape braces
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse a template string
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(format!("unclosed placeholder in template '{source}'"));
                    }
                    let expr = PathExpr::parse(inner.trim()).map_err(|e| e.to_string())?;
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    parts.push(TemplatePart::Path(expr));
                }
                '}' => return Err(format!("unmatched '}}' in template '{source}'")),
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(Self { parts })
    }

    /// Render with the first value of each placeholder; absent values render empty
    pub fn render(&self, record: &Record, evaluator: &PathEvaluator) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                TemplatePart::Text(t) => t.clone(),
                TemplatePart::Path(expr) => evaluator
                    .evaluate(record, expr)
                    .first()
                    .map(value_text)
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// A compiled column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Output column name
    pub name: String,
    /// Expression producing the values
    pub expression: Expression,
    /// Declared leaf type; untyped columns are stored as strings
    pub data_type: Option<DataType>,
    /// Keep every value as a list
    pub multiple: bool,
    /// An empty result fails the record
    pub required: bool,
}

impl ColumnSpec {
    /// Storage type of this column
    pub fn storage_type(&self) -> DataType {
        if let Some(t) = self.data_type {
            return t;
        }
        match &self.expression {
            Expression::Function(call) => match call.name() {
                FunctionName::Count => DataType::Integer,
                FunctionName::Exists => DataType::Boolean,
                _ => DataType::String,
            },
            _ => DataType::String,
        }
    }

    fn compile(doc: &ColumnDocument) -> std::result::Result<Self, String> {
        let declared = [
            doc.path.is_some(),
            doc.literal.is_some(),
            doc.template.is_some(),
            doc.function.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if declared != 1 {
            return Err(format!(
                "column '{}' must declare exactly one of path, literal, template or function",
                doc.name
            ));
        }
        if doc.function.is_none() && !doc.args.is_empty() {
            return Err(format!("column '{}': args are only valid with function", doc.name));
        }

        let expression = if let Some(path) = &doc.path {
            Expression::Path(PathExpr::parse(path).map_err(|e| format!("column '{}': {e}", doc.name))?)
        } else if let Some(literal) = &doc.literal {
            if (literal.is_object() || literal.is_array()) && doc.data_type != Some(DataType::Json) {
                return Err(format!(
                    "column '{}': complex literal requires type = \"json\"",
                    doc.name
                ));
            }
            Expression::Literal(literal.clone())
        } else if let Some(template) = &doc.template {
            Expression::Template(
                Template::parse(template).map_err(|e| format!("column '{}': {e}", doc.name))?,
            )
        } else if let Some(function) = &doc.function {
            Expression::Function(
                FunctionCall::compile(function, &doc.args)
                    .map_err(|e| format!("column '{}': {e}", doc.name))?,
            )
        } else {
            return Err(format!("column '{}' has no expression", doc.name));
        };

        Ok(Self {
            name: doc.name.clone(),
            expression,
            data_type: doc.data_type,
            multiple: doc.multiple,
            required: doc.required,
        })
    }
}

/// A validated, immutable mapping specification
#[derive(Debug, Clone)]
pub struct MappingSpec {
    resource_type: ResourceType,
    version: u32,
    description: Option<String>,
    columns: Vec<ColumnSpec>,
    rules: Vec<BusinessRule>,
    standardize: Vec<String>,
    schema: TableSchema,
    content_hash: String,
}

impl MappingSpec {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let doc: MappingDocument = toml::from_str(source)
            .map_err(|e| StrataError::Configuration(format!("mapping spec is not valid TOML: {e}")))?;
        Self::from_document(doc)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(source: &str) -> Result<Self> {
        let doc: MappingDocument = serde_json::from_str(source)
            .map_err(|e| StrataError::Configuration(format!("mapping spec is not valid JSON: {e}")))?;
        Self::from_document(doc)
    }

    /// Validate a parsed document
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Configuration`] when the version is missing or zero,
    /// column names are empty, duplicated or reserved, an expression does not
    /// parse, a rule does not compile or references an unknown column, or a
    /// `standardize` entry is not a column.
    pub fn from_document(doc: MappingDocument) -> Result<Self> {
        let invalid = |msg: String| {
            StrataError::Configuration(format!(
                "invalid mapping spec for {}: {msg}",
                doc.resource_type
            ))
        };

        let resource_type = ResourceType::new(doc.resource_type.clone()).map_err(invalid)?;
        let version = match doc.version {
            None => return Err(invalid("version is required".to_string())),
            Some(0) => return Err(invalid("version must be at least 1".to_string())),
            Some(v) => v,
        };
        if doc.columns.is_empty() {
            return Err(invalid("at least one column is required".to_string()));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(doc.columns.len());
        for column in &doc.columns {
            if column.name.trim().is_empty() {
                return Err(invalid("column name cannot be empty".to_string()));
            }
            if RESERVED_COLUMNS.contains(&column.name.as_str()) {
                return Err(invalid(format!(
                    "column name '{}' is reserved for provenance",
                    column.name
                )));
            }
            if !seen.insert(column.name.clone()) {
                return Err(invalid(format!("duplicate column name '{}'", column.name)));
            }
            columns.push(ColumnSpec::compile(column).map_err(invalid)?);
        }

        let mut rules = Vec::with_capacity(doc.rules.len());
        for rule in &doc.rules {
            if !seen.contains(&rule.field) {
                return Err(invalid(format!(
                    "rule '{}' references unknown column '{}'",
                    rule.id, rule.field
                )));
            }
            rules.push(BusinessRule::compile(rule.clone()).map_err(invalid)?);
        }

        if let Some(unknown) = doc.standardize.iter().find(|c| !seen.contains(*c)) {
            return Err(invalid(format!("standardize references unknown column '{unknown}'")));
        }

        let schema = TableSchema::new(
            resource_type.clone(),
            version,
            columns
                .iter()
                .map(|c| ColumnDef {
                    name: c.name.clone(),
                    data_type: c.storage_type(),
                    multiple: c.multiple,
                })
                .collect(),
        );
        let content_hash = content_hash(&doc)?;

        Ok(Self {
            resource_type,
            version,
            description: doc.description,
            columns,
            rules,
            standardize: doc.standardize,
            schema,
            content_hash,
        })
    }

    /// Resource type mapped by this spec
    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Spec version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Free-text description
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Compiled business rules
    pub fn rules(&self) -> &[BusinessRule] {
        &self.rules
    }

    /// Columns normalized by the `standardize_codes` post-hook
    pub fn standardize(&self) -> &[String] {
        &self.standardize
    }

    /// Output schema declared by this version
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// SHA-256 over the canonical document
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

fn content_hash(doc: &MappingDocument) -> Result<String> {
    let canonical = serde_json::to_vec(doc)?;
    Ok(format!("{:x}", Sha256::digest(&canonical)))
}
