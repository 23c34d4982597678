// Public modules
pub mod config;
pub mod error;
pub mod executor;
pub mod registry;
pub mod script;
pub mod selection;
pub mod stage;
pub mod stages;
pub mod wheelhouse;

// Re-export common types for convenience
pub use error::{Error, Result};
