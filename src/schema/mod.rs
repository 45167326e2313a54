//! Input record schema
//!
//! This module defines the three input collections (offer catalog, user
//! profiles, event log) as they appear on disk, and the loader that turns
//! newline-delimited JSON into complete, typed records.

mod loader;
mod records;

pub use loader::*;
pub use records::*;
