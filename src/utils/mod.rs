//! Generic utility primitives with zero domain knowledge.
//!
//! - `shell` - Shell escaping and quoting for generated scripts

pub mod shell;
