//! Integration tests for the element index.
//!
//! These exercise the manager over real source caches: a local portfolio
//! on disk and in-memory GitHub and collection remotes.

mod cache_behavior;
mod fixture;
mod persistence;
mod resolve_tests;
mod source_tests;
