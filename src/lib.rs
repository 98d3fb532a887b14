//! Multi-source element index.
//!
//! Indexes named, typed, versioned elements held in a local portfolio, a
//! GitHub portfolio and the community collection, and answers two
//! questions: what matches a query across all sources, and where the
//! authoritative copy of an element lives.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod index;
pub mod manager;
pub mod search;
pub mod test_utils;

pub use error::{IndexError, Result};
pub use manager::{ResolveOptions, Resolved, SearchOptions, SearchPage, UnifiedIndexManager};

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
