//! Shared leaf utilities for the routd framework.
//!
//! This crate intentionally stays dependency-light: it hosts the tagged
//! error value used across the router and session crates, and the generic
//! n-ary tree backing the router's path index.

pub mod error;
pub mod tree;

pub use error::{Error, SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE_MESSAGE};
pub use tree::{NodeId, Traverse, Tree, TreeElement};
