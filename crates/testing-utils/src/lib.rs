//! # TaskDeps Testing Utils
//!
//! Shared testing utilities for the task dependency workspace.
//!
//! ## Features
//!
//! - **Mock Repositories**: In-memory implementations of all repository traits,
//!   with the same uniqueness, cycle and cascade rules as the SQLite store
//! - **Test Data Builders**: Tasks, dependencies and preferences with sensible defaults
//! - **Helpers**: A controllable clock, a recording channel sender and date fixtures
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! taskdeps-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
