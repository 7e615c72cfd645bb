//! Foundational data structures, error types, and the document tree.

pub mod error;
pub mod models;
pub mod node;
