//! Dataset and state storage collaborators
//!
//! - [`traits`] - the [`Dataset`] and [`StateStorage`] interfaces the core writes through
//! - [`memory`] - in-process implementations for dry runs and tests
//! - [`local`] - local filesystem implementations (JSON Lines + schema sidecar, JSON state file)

pub mod local;
pub mod memory;
pub mod traits;

pub use local::{FileStateStorage, LocalDataset};
pub use memory::{InMemoryDataset, InMemoryStateStorage};
pub use traits::{Dataset, StateStorage};
