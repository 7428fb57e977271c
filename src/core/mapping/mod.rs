//! Declarative mapping specifications
//!
//! - [`spec`] - document format, column expressions and validation on load
//! - [`functions`] - named functions usable as column expressions
//! - [`coerce`] - leaf type coercion for typed columns
//! - [`loader`] - directory loader and the immutable [`MappingCatalog`]

pub mod coerce;
pub mod functions;
pub mod loader;
pub mod spec;

pub use coerce::coerce;
pub use functions::{FunctionCall, FunctionName};
pub use loader::{MappingCatalog, MappingLoader};
pub use spec::{ColumnDocument, ColumnSpec, Expression, MappingDocument, MappingSpec, Template};
