//! Incremental write coordination
//!
//! [`WriteCoordinator::commit`] pairs a dataset append with the cursor advance
//! for one resource type:
//!
//! 1. Reject the batch if any row carries an undeclared column or the schema
//!    differs from the one pinned in the dataset
//! 2. Drop rows whose `(source_resource_id, source_last_updated)` is already stored
//! 3. Append the remaining rows (all-or-nothing)
//! 4. Advance and persist the cursor
//!
//! A crash between 3 and 4 leaves the old watermark in place; the next run
//! re-extracts the same records and step 2 absorbs them.

pub mod coordinator;

pub use coordinator::{CommitBatch, CommitStatus, WriteCoordinator, WriteResult};
