// Cursor state for incremental extraction

pub mod cursor;
pub mod manager;

pub use cursor::{Cursor, CursorBuilder, CursorStatus};
pub use manager::StateManager;
