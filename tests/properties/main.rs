//! Property-based tests for ranking, merging and version ordering.

mod ranking_props;
mod version_props;
