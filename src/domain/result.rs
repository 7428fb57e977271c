//! Result type alias for Strata

use super::errors::StrataError;

/// Result type alias for Strata operations
///
/// # Examples
///
/// ```
/// use strata::domain::result::Result;
/// use strata::domain::errors::StrataError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(StrataError::Mapping("unknown function".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, StrataError>;
