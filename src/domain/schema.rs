//! Output table schemas
//!
//! A [`TableSchema`] is the column contract for one `(resource_type, mapping_version)`.
//! Once a dataset has been written with a schema, that schema is pinned and any
//! divergence is a schema violation.

use crate::domain::ids::ResourceType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Provenance column carrying the source resource id
pub const SOURCE_RESOURCE_ID: &str = "source_resource_id";
/// Provenance column carrying the mapping version
pub const MAPPING_VERSION: &str = "mapping_version";
/// Provenance column carrying the extraction time
pub const EXTRACTED_AT: &str = "extracted_at";
/// Provenance column carrying the source `meta.lastUpdated`
pub const SOURCE_LAST_UPDATED: &str = "source_last_updated";

/// Column names reserved for provenance; mapping columns may not use them
pub const RESERVED_COLUMNS: [&str; 4] = [
    SOURCE_RESOURCE_ID,
    MAPPING_VERSION,
    EXTRACTED_AT,
    SOURCE_LAST_UPDATED,
];

/// Leaf data type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Text
    #[default]
    String,
    /// 64-bit signed integer
    Integer,
    /// Floating point number
    Decimal,
    /// true/false
    Boolean,
    /// Calendar date (`YYYY-MM-DD`)
    Date,
    /// RFC 3339 instant
    DateTime,
    /// Complex element kept as JSON
    Json,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::DateTime => "datetime",
            DataType::Json => "json",
        };
        f.write_str(s)
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "decimal" | "number" => Ok(Self::Decimal),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "datetime" | "instant" => Ok(Self::DateTime),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown data type: {s}")),
        }
    }
}

/// One declared output column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Leaf data type
    pub data_type: DataType,
    /// Whether the column holds a list of values
    #[serde(default)]
    pub multiple: bool,
}

impl ColumnDef {
    /// Create a single-valued column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            multiple: false,
        }
    }

    /// Mark the column as list-valued
    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// Column contract of one `(resource_type, mapping_version)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Resource type the table holds
    pub resource_type: ResourceType,
    /// Mapping version that produced the rows
    pub mapping_version: u32,
    /// SHA-256 over the canonical column list
    pub fingerprint: String,
    /// Ordered mapping columns (provenance columns are implicit)
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Build a schema and compute its fingerprint
    pub fn new(resource_type: ResourceType, mapping_version: u32, columns: Vec<ColumnDef>) -> Self {
        let fingerprint = fingerprint_columns(&resource_type, mapping_version, &columns);
        Self {
            resource_type,
            mapping_version,
            fingerprint,
            columns,
        }
    }

    /// Whether a column with this name is declared
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Declared column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names from `names` that are not declared columns
    pub fn undeclared<'a, I>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let declared: HashSet<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        names
            .into_iter()
            .filter(|n| !declared.contains(n.as_str()))
            .cloned()
            .collect()
    }

    /// Describe how `other` diverges from this schema, or `None` if identical
    pub fn diff(&self, other: &TableSchema) -> Option<String> {
        if self.resource_type != other.resource_type {
            return Some(format!(
                "resource type {} differs from pinned {}",
                other.resource_type, self.resource_type
            ));
        }
        if self.mapping_version != other.mapping_version {
            return Some(format!(
                "mapping version {} differs from pinned version {}",
                other.mapping_version, self.mapping_version
            ));
        }
        if self.fingerprint != other.fingerprint || self.columns != other.columns {
            return Some(format!(
                "columns of version {} changed (fingerprint {} vs pinned {})",
                other.mapping_version,
                short(&other.fingerprint),
                short(&self.fingerprint)
            ));
        }
        None
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

fn fingerprint_columns(resource_type: &ResourceType, version: u32, columns: &[ColumnDef]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_type.as_str().as_bytes());
    hasher.update(version.to_be_bytes());
    for column in columns {
        hasher.update(b"\x1f");
        hasher.update(column.name.as_bytes());
        hasher.update(b":");
        hasher.update(column.data_type.to_string().as_bytes());
        if column.multiple {
            hasher.update(b"[]");
        }
    }
    format!("{:x}", hasher.finalize())
}
