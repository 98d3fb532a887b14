//! Core element types and policy

pub mod element;
pub mod priority;
pub mod version;

pub use element::{ElementKey, ElementType, IndexEntry, SourceKind, SourceRef, UnifiedEntry};
pub use priority::SourcePriorityConfig;
pub use version::{compare_versions, is_newer};
