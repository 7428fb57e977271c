//! Domain models and types for Strata.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ResourceType`], [`ResourceId`])
//! - **Records and rows** ([`Record`], [`Row`], [`Provenance`])
//! - **Table schemas** ([`TableSchema`], [`ColumnDef`], [`DataType`])
//! - **Error types** ([`StrataError`], [`ExtractError`], [`StorageError`], [`ErrorKind`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! ```rust
//! use strata::domain::{ResourceType, ResourceId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resource_type = ResourceType::new("Observation")?;
//! let id = ResourceId::new("obs-1")?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod record;
pub mod result;
pub mod row;
pub mod schema;

// Re-export commonly used types for convenience
pub use errors::{ErrorKind, ExtractError, StorageError, StrataError};
pub use ids::{ResourceId, ResourceType};
pub use record::{Record, RecordIdentity};
pub use result::Result;
pub use row::{Provenance, Row, RowKey};
pub use schema::{ColumnDef, DataType, TableSchema};
