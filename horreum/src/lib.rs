//! # Horreum — a type-keyed service registry for Rust
//!
//! Callers register how to produce an object for a given abstract type and
//! later retrieve concrete instances, with the registry resolving
//! constructor dependencies, caching singletons, and aggregating multiple
//! providers of one type into a unified group.

pub use horreum_container::*;
pub use horreum_support::rendering;
