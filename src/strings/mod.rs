//! String collaborators
//!
//! The engine never stores string contents in columns; it stores interned
//! ids and talks to the pool and matchers below through narrow interfaces.
//!
//! # Invariants
//!
//! - A `StringId` is only meaningful against the pool that produced it
//! - Interning the same string twice yields the same id

mod glob;
mod pool;

pub use glob::GlobMatcher;
pub use pool::{StringId, StringPool};
