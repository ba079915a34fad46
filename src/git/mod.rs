//! Git operations module
//!
//! This module provides a trait-based interface over the handful of git
//! operations provisioning needs, implemented with libgit2 bindings.

pub mod operations;

pub use operations::{Git2Operations, GitOperations, PushAuth};
