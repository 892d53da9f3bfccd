//! # Horreum Support
//!
//! Shared utilities for the Horreum service registry.
//!
//! This crate provides:
//! - Type-name shortening for binding descriptions
//! - "Did you mean?" suggestions for lookup errors

pub mod rendering;
