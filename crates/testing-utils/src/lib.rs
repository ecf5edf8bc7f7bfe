//! # Formfill Testing Utils
//!
//! Shared testing utilities for the form-fill campaign scheduler.
//! This crate provides mock implementations and test data builders
//! that can be used across all other crates in the workspace.
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! formfill-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use mocks::*;
